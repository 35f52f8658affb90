//! Backstore Metrics
//!
//! Per-kind counters for storage object lifecycle operations, kept in a
//! private prometheus registry and rendered in the text exposition format.

use crate::domain::ports::BackstoreKind;
use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Lifecycle counters labelled by backstore kind
#[derive(Clone)]
pub struct BackstoreMetrics {
    registry: Registry,
    created: IntCounterVec,
    deleted: IntCounterVec,
    backends_deleted: IntCounterVec,
    create_failures: IntCounterVec,
    rollbacks: IntCounterVec,
}

impl std::fmt::Debug for BackstoreMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackstoreMetrics").finish_non_exhaustive()
    }
}

impl BackstoreMetrics {
    /// Create and register all counters
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let created = counter(
            &registry,
            "backstore_storage_objects_created_total",
            "Storage objects created",
        )?;
        let deleted = counter(
            &registry,
            "backstore_storage_objects_deleted_total",
            "Storage objects deleted",
        )?;
        let backends_deleted = counter(
            &registry,
            "backstore_backends_deleted_total",
            "Backends removed, after their last storage object or by name",
        )?;
        let create_failures = counter(
            &registry,
            "backstore_create_failures_total",
            "Failed storage object creations",
        )?;
        let rollbacks = counter(
            &registry,
            "backstore_rollbacks_total",
            "Backends torn down after a failed storage object creation",
        )?;

        Ok(Self {
            registry,
            created,
            deleted,
            backends_deleted,
            create_failures,
            rollbacks,
        })
    }

    #[inline]
    pub fn record_created(&self, kind: BackstoreKind) {
        self.created.with_label_values(&[kind.plugin()]).inc();
    }

    #[inline]
    pub fn record_deleted(&self, kind: BackstoreKind, backend_removed: bool) {
        self.deleted.with_label_values(&[kind.plugin()]).inc();
        if backend_removed {
            self.backends_deleted.with_label_values(&[kind.plugin()]).inc();
        }
    }

    /// Backend removed by name, after its objects were counted as deleted
    #[inline]
    pub fn record_backend_deleted(&self, kind: BackstoreKind) {
        self.backends_deleted.with_label_values(&[kind.plugin()]).inc();
    }

    #[inline]
    pub fn record_create_failure(&self, kind: BackstoreKind) {
        self.create_failures.with_label_values(&[kind.plugin()]).inc();
    }

    #[inline]
    pub fn record_rollback(&self, kind: BackstoreKind) {
        self.rollbacks.with_label_values(&[kind.plugin()]).inc();
    }

    /// Objects created for a kind
    pub fn created(&self, kind: BackstoreKind) -> u64 {
        self.created.with_label_values(&[kind.plugin()]).get()
    }

    /// Objects deleted for a kind
    pub fn deleted(&self, kind: BackstoreKind) -> u64 {
        self.deleted.with_label_values(&[kind.plugin()]).get()
    }

    /// Backends removed for a kind
    pub fn backends_deleted(&self, kind: BackstoreKind) -> u64 {
        self.backends_deleted.with_label_values(&[kind.plugin()]).get()
    }

    /// Rollbacks performed for a kind
    pub fn rollbacks(&self, kind: BackstoreKind) -> u64 {
        self.rollbacks.with_label_values(&[kind.plugin()]).get()
    }

    /// Creation failures for a kind
    pub fn create_failures(&self, kind: BackstoreKind) -> u64 {
        self.create_failures.with_label_values(&[kind.plugin()]).get()
    }

    /// Render all counters in the prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("Metrics encoding failed: {}", e)))
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), &["kind"])
        .map_err(|e| Error::Internal(format!("Invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(counter)
}
