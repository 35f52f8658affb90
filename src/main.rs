//! Backstore Manager CLI
//!
//! One-shot commands over the backend manager: create, delete, list and
//! complete storage objects of every backstore kind, and inspect or delete
//! backends in the legacy per-backend view.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use backstore_manager::backstore::legacy_root_summary;
use backstore_manager::{
    BackendManager, BackstoreKind, BlockRequest, Config, CreateOutcome, DriverFactory, DriverKind,
    Error, FileIoRequest, PscsiRequest, RamDiskRequest, SizeInput, StorageObjectView, SysfsProbe,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Backstore Manager - SCSI target backstore lifecycle
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "BACKSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Driver to use (memory, configfs)
    #[arg(long, env = "BACKSTORE_DRIVER")]
    driver: Option<DriverKind>,

    /// Target configfs root
    #[arg(long, env = "BACKSTORE_CONFIGFS_ROOT")]
    configfs_root: Option<PathBuf>,

    /// Path to sysfs
    #[arg(long, env = "BACKSTORE_SYSFS_PATH")]
    sysfs_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a storage object and its backend
    #[command(subcommand)]
    Create(CreateCommand),

    /// Delete a storage object, and its backend once empty
    Delete {
        kind: BackstoreKind,
        name: String,
    },

    /// List storage objects
    Ls {
        /// Only list this kind
        kind: Option<BackstoreKind>,
        #[arg(long)]
        json: bool,
    },

    /// Complete a storage object name
    Complete {
        kind: BackstoreKind,
        #[arg(default_value = "")]
        prefix: String,
    },

    /// List live backends (legacy view)
    Backends {
        #[arg(long)]
        json: bool,
    },

    /// Delete a backend (e.g. fileio_4) with all of its storage objects
    DeleteBackend { backend: String },

    /// Complete a backend name
    CompleteBackend {
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Show the plugin version of a backend, or of a storage object's backend
    Version {
        /// Backend name, or storage object name with --kind
        target: String,
        #[arg(long)]
        kind: Option<BackstoreKind>,
    },

    /// Show inventory counts and lifecycle counters
    Stats,
}

#[derive(Subcommand, Debug)]
enum CreateCommand {
    /// Pass-through SCSI device
    Pscsi {
        name: String,
        /// Device path or H:C:T:L address
        dev: String,
    },

    /// Direct-mapped ram disk
    RdDr {
        name: String,
        size: SizeInput,
        #[arg(long)]
        generate_wwn: Option<bool>,
    },

    /// Multi-page ram disk
    RdMcp {
        name: String,
        size: SizeInput,
        #[arg(long)]
        generate_wwn: Option<bool>,
    },

    /// File or device through the VFS
    Fileio {
        name: String,
        file_or_dev: String,
        /// Required when the file does not exist yet
        size: Option<SizeInput>,
        #[arg(long)]
        generate_wwn: Option<bool>,
        #[arg(long)]
        buffered: Option<bool>,
        #[arg(long)]
        sparse: Option<bool>,
    },

    /// Block device
    Block {
        name: String,
        dev: String,
        #[arg(long)]
        generate_wwn: Option<bool>,
    },
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e.downcast_ref::<Error>().map(Error::exit_code).unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    info!("Starting {} {}", backstore_manager::NAME, backstore_manager::VERSION);
    info!("  Driver: {}", config.driver);
    info!("  Configfs root: {}", config.configfs.root.display());

    if config.driver == DriverKind::Memory {
        warn!("Using the memory driver, changes are discarded on exit");
    }

    let driver = DriverFactory::create(config.driver, &config.configfs);
    let probe = Arc::new(SysfsProbe::new(&config.configfs.sysfs_path));
    let manager = BackendManager::new(driver, probe, config.manager)
        .context("Failed to initialise the backend manager")?;

    match args.command {
        Command::Create(create) => {
            let outcome = run_create(&manager, create)?;
            print_created(&outcome);
        }
        Command::Delete { kind, name } => {
            let outcome = manager
                .delete(kind, &name)
                .with_context(|| format!("Failed to delete {}/{}", kind, name))?;
            println!("Deleted storage object {}.", outcome.name);
            if outcome.backend_removed {
                debug!("Backend {} removed", outcome.backend);
            }
        }
        Command::Ls { kind, json } => {
            let groups = match kind {
                Some(kind) => vec![manager.group(kind)?],
                None => manager.groups()?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                for group in &groups {
                    println!("{}: {}", group.kind, group.summary().0);
                    for view in &group.objects {
                        print_view(view);
                    }
                }
            }
        }
        Command::Complete { kind, prefix } => {
            for completion in manager.completions(kind, &prefix)? {
                println!("{}", completion);
            }
        }
        Command::Backends { json } => {
            let backends = manager.legacy_backends()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&backends)?);
            } else {
                println!("backstores: {}", legacy_root_summary(&backends).0);
                for backend in &backends {
                    println!("  {}: {}", backend.name, backend.summary().0);
                    for name in &backend.object_names {
                        println!("    {}", name);
                    }
                }
            }
        }
        Command::DeleteBackend { backend } => {
            let outcome = manager
                .delete_backend(&backend)
                .with_context(|| format!("Failed to delete backstore {}", backend))?;
            for name in &outcome.objects_removed {
                debug!("Storage object {} removed with {}", name, outcome.backend);
            }
            println!("Deleted backstore {}.", outcome.backend);
        }
        Command::CompleteBackend { prefix } => {
            for completion in manager.backend_completions(&prefix)? {
                println!("{}", completion);
            }
        }
        Command::Version { target, kind } => {
            let version = match kind {
                Some(kind) => manager.object_plugin_version(kind, &target)?,
                None => manager.plugin_version(&target)?,
            };
            println!("{}", version);
        }
        Command::Stats => {
            for group in manager.groups()? {
                let backends = group
                    .objects
                    .iter()
                    .map(|view| view.backend())
                    .collect::<std::collections::BTreeSet<_>>()
                    .len();
                println!(
                    "{}: {} on {} backend(s)",
                    group.kind,
                    group.summary().0,
                    backends
                );
            }
            print!("{}", manager.metrics().render()?);
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    // Flags and environment override the file
    if let Some(driver) = args.driver {
        config.driver = driver;
    }
    if let Some(root) = &args.configfs_root {
        config.configfs.root = root.clone();
    }
    if let Some(sysfs) = &args.sysfs_path {
        config.configfs.sysfs_path = sysfs.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run_create(manager: &BackendManager, command: CreateCommand) -> anyhow::Result<CreateOutcome> {
    let outcome = match command {
        CreateCommand::Pscsi { name, dev } => manager
            .create_pscsi(PscsiRequest {
                name: name.clone(),
                device: dev,
            })
            .with_context(|| format!("Failed to create pscsi storage object {}", name))?,
        CreateCommand::RdDr {
            name,
            size,
            generate_wwn,
        } => manager
            .create_rd_dr(RamDiskRequest {
                name: name.clone(),
                size,
                generate_wwn,
            })
            .with_context(|| format!("Failed to create rd_dr ramdisk {}", name))?,
        CreateCommand::RdMcp {
            name,
            size,
            generate_wwn,
        } => manager
            .create_rd_mcp(RamDiskRequest {
                name: name.clone(),
                size,
                generate_wwn,
            })
            .with_context(|| format!("Failed to create rd_mcp ramdisk {}", name))?,
        CreateCommand::Fileio {
            name,
            file_or_dev,
            size,
            generate_wwn,
            buffered,
            sparse,
        } => manager
            .create_fileio(FileIoRequest {
                name: name.clone(),
                file_or_dev,
                size,
                generate_wwn,
                buffered,
                sparse,
            })
            .with_context(|| format!("Failed to create fileio storage object {}", name))?,
        CreateCommand::Block {
            name,
            dev,
            generate_wwn,
        } => manager
            .create_block(BlockRequest {
                name: name.clone(),
                device: dev,
                generate_wwn,
            })
            .with_context(|| format!("Failed to create block storage object {}", name))?,
    };
    Ok(outcome)
}

fn print_created(outcome: &CreateOutcome) {
    for notice in &outcome.notices {
        println!("{}", notice);
    }
    println!(
        "Created {} storage object {} on backend {}.",
        outcome.object.object.kind,
        outcome.object.name,
        outcome.object.backend()
    );
    print_view(&outcome.object);
}

fn print_view(view: &StorageObjectView) {
    let (summary, healthy) = view.summary();
    let marker = if healthy { "ok" } else { "!!" };
    println!("  [{}] {}: {}", marker, view.name, summary);
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr; stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
