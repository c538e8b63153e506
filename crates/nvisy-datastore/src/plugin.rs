//! Plugin descriptor for hosts that load datastores from a JSON config.

use serde_json::{Map, Value};

use crate::{BucketDatastore, DatastoreConfig, DiskSpec, Result, TRACING_TARGET_DATASTORE};

/// Registers the bucket datastore with a plugin host.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatastorePlugin;

impl DatastorePlugin {
    /// Plugin name.
    pub const NAME: &'static str = "bucket-datastore-plugin";
    /// Plugin version, the crate version.
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
    /// Datastore type name used in host configuration files.
    pub const DATASTORE_TYPE: &'static str = "bucketds";

    /// Returns the plugin name.
    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Returns the plugin version.
    pub fn version(&self) -> &'static str {
        Self::VERSION
    }

    /// Returns the datastore type name.
    pub fn datastore_type_name(&self) -> &'static str {
        Self::DATASTORE_TYPE
    }

    /// Parses the datastore section of a host configuration.
    pub fn parse_config(&self, map: &Map<String, Value>) -> Result<DatastoreConfig> {
        DatastoreConfig::from_map(map)
    }

    /// Returns the on-disk identity for a parsed configuration.
    pub fn disk_spec(&self, config: &DatastoreConfig) -> DiskSpec {
        config.disk_spec()
    }

    /// Connects a datastore for a parsed configuration.
    pub fn create(&self, config: &DatastoreConfig) -> Result<BucketDatastore> {
        tracing::debug!(
            target: TRACING_TARGET_DATASTORE,
            plugin = Self::NAME,
            version = Self::VERSION,
            "Creating datastore from plugin config"
        );
        BucketDatastore::connect(config)
    }
}
