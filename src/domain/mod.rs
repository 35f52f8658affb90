//! Domain layer - Core types and port definitions
//!
//! This module defines the backstore data model and the traits (ports) that
//! resource drivers and device probes implement.

pub mod ports;

pub use ports::*;
