#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for datastore facade operations.
///
/// Use this target for logging datastore initialization and single-key operations.
pub const TRACING_TARGET_DATASTORE: &str = "nvisy_datastore::datastore";

/// Tracing target for batch commits.
///
/// Use this target for logging job dispatch, worker lifecycle, and commit failures.
pub const TRACING_TARGET_BATCH: &str = "nvisy_datastore::batch";

/// Tracing target for paginated queries.
pub const TRACING_TARGET_QUERY: &str = "nvisy_datastore::query";

/// Tracing target for remote bucket calls.
pub const TRACING_TARGET_BUCKET: &str = "nvisy_datastore::bucket";

/// Largest amount of objects a single list call may return.
pub const LIST_MAX: usize = 1000;

/// Largest amount of objects a single multi-delete call may remove.
pub const DELETE_MAX: usize = 1000;

/// Worker count used by batch commits when none is configured.
pub const DEFAULT_WORKERS: usize = 100;

pub mod batch;
pub mod bucket;
mod config;
mod datastore;
mod error;
mod key;
mod mapper;
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;
mod plugin;
pub mod query;

#[doc(hidden)]
pub mod prelude;

pub use config::{DatastoreConfig, DiskSpec};
pub use datastore::{Batching, BucketDatastore, Datastore};
pub use error::{BatchCommitError, Error, JobFailure, Result};
pub use key::Key;
pub use mapper::KeyMapper;
pub use plugin::DatastorePlugin;
