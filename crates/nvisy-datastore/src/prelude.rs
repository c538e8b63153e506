//! Prelude module for nvisy-datastore.
//!
//! This module re-exports the most commonly used types and traits from
//! nvisy-datastore, making it easy to import everything you need with a
//! single `use` statement.
//!
//! # Example
//!
//! ```rust,ignore
//! use nvisy_datastore::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = DatastoreConfig::new("blocks", "access-key", "secret");
//! let store = BucketDatastore::connect(&config)?;
//! store.put(&Key::new("/hello"), Bytes::from("world")).await?;
//! # Ok(())
//! # }
//! ```

// Batch types
pub use bytes::Bytes;

pub use crate::batch::{Batch, PendingOp};
// Bucket types
pub use crate::bucket::{Bucket, BucketError, BucketErrorKind, ObjectStoreBucket};
// Query types
pub use crate::query::{Entry, Query, QueryResult, QueryResults};
// Datastore types
pub use crate::{
    BatchCommitError, Batching, BucketDatastore, Datastore, DatastoreConfig, DatastorePlugin,
    DiskSpec, Key, KeyMapper,
};
// Error types
pub use crate::{Error, Result};
