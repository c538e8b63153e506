//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── datastore: DatastoreConfig  # Bucket, credentials, root directory, workers
//! └── command: Command            # put, get, has, size, rm, ls
//! ```
//!
//! All datastore options can be provided via CLI arguments or environment
//! variables. Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! nvisy-cli --datastore-bucket blocks --datastore-endpoint http://localhost:9000 ls /
//!
//! # Or via environment variables
//! DATASTORE_BUCKET=blocks DATASTORE_ACCESS_KEY_ID=... nvisy-cli get /blocks/abc
//! ```

use std::process;

use anyhow::Context;
use clap::Parser;
use nvisy_datastore::DatastoreConfig;

use crate::command::Command;
use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "nvisy")]
#[command(about = "Inspect and modify a bucket-backed Nvisy datastore")]
#[command(version)]
pub struct Cli {
    /// Datastore connection configuration.
    #[clap(flatten)]
    pub datastore: DatastoreConfig,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// This is the preferred way to initialize the CLI configuration as it ensures
    /// .env files are loaded before clap parses arguments, allowing environment
    /// variables from .env to be used as defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.datastore
            .validate()
            .context("invalid datastore configuration")?;
        Ok(())
    }

    /// Logs configuration at debug level (no sensitive information).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            bucket = %self.datastore.bucket_name,
            endpoint = ?self.datastore.endpoint,
            region = ?self.datastore.region,
            root_directory = %self.datastore.root_directory,
            workers = self.datastore.workers(),
            "Datastore configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
