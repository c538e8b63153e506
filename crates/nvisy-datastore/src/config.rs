//! Datastore connection configuration.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{DEFAULT_WORKERS, Error, Result};

/// Configuration for a bucket-backed datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[serde(rename_all = "camelCase")]
pub struct DatastoreConfig {
    /// Object storage endpoint URL (provider default when unset)
    #[cfg_attr(
        feature = "config",
        arg(long = "datastore-endpoint", env = "DATASTORE_ENDPOINT")
    )]
    pub endpoint: Option<String>,

    /// Access key identifier
    #[cfg_attr(
        feature = "config",
        arg(long = "datastore-access-key-id", env = "DATASTORE_ACCESS_KEY_ID")
    )]
    pub access_key_id: String,

    /// Secret access key
    #[cfg_attr(
        feature = "config",
        arg(
            long = "datastore-access-key-secret",
            env = "DATASTORE_ACCESS_KEY_SECRET",
            hide_env_values = true
        )
    )]
    #[serde(default, skip_serializing)]
    pub access_key_secret: String,

    /// Bucket holding the datastore objects
    #[cfg_attr(
        feature = "config",
        arg(long = "datastore-bucket", env = "DATASTORE_BUCKET")
    )]
    pub bucket_name: String,

    /// Directory inside the bucket that prefixes every object name
    #[cfg_attr(
        feature = "config",
        arg(
            long = "datastore-root-directory",
            env = "DATASTORE_ROOT_DIRECTORY",
            default_value = ""
        )
    )]
    #[serde(default)]
    pub root_directory: String,

    /// Bucket region (optional)
    #[cfg_attr(
        feature = "config",
        arg(long = "datastore-region", env = "DATASTORE_REGION")
    )]
    pub region: Option<String>,

    /// Maximum concurrent batch commit workers (default 100)
    #[cfg_attr(
        feature = "config",
        arg(long = "datastore-workers", env = "DATASTORE_WORKERS")
    )]
    pub workers: Option<usize>,
}

impl DatastoreConfig {
    /// Create a new configuration for `bucket` with the given credentials.
    pub fn new(
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: None,
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            bucket_name: bucket.into(),
            root_directory: String::new(),
            region: None,
            workers: None,
        }
    }

    /// Parses the loosely typed map a plugin host hands over.
    ///
    /// Recognised keys are `bucket`, `idKey` and `secretKey` (required
    /// strings), `regionEndpoint` and `rootDirectory` (optional strings) and
    /// `workers` (optional positive integer).
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let bucket = required_string(map, "bucket")?;
        let access_key_id = required_string(map, "idKey")?;
        let access_key_secret = required_string(map, "secretKey")?;

        let mut config = Self::new(bucket, access_key_id, access_key_secret);
        config.endpoint = optional_string(map, "regionEndpoint")?;
        config.root_directory = optional_string(map, "rootDirectory")?.unwrap_or_default();

        if let Some(value) = map.get("workers") {
            let workers = value
                .as_f64()
                .ok_or_else(|| Error::invalid_config("workers not a number"))?;
            if workers <= 0.0 {
                return Err(Error::invalid_config(format!("workers <= 0: {workers}")));
            }
            if workers.fract() != 0.0 || workers > usize::MAX as f64 {
                return Err(Error::invalid_config(format!(
                    "workers is not an integer: {workers}"
                )));
            }
            config.workers = Some(workers as usize);
        }

        Ok(config)
    }

    /// Returns the worker count, using the default if not set.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS)
    }

    /// Returns the on-disk identity of this datastore.
    pub fn disk_spec(&self) -> DiskSpec {
        DiskSpec {
            bucket: self.bucket_name.clone(),
            root_directory: self.root_directory.clone(),
        }
    }

    /// Set the endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the root directory.
    #[must_use]
    pub fn with_root_directory(mut self, root_directory: impl Into<String>) -> Self {
        self.root_directory = root_directory.into();
        self
    }

    /// Set the bucket region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the number of batch commit workers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Checks that the configuration can be used to connect.
    pub fn validate(&self) -> Result<()> {
        if self.bucket_name.trim().is_empty() {
            return Err(Error::invalid_config("no bucket specified"));
        }
        if self.access_key_id.is_empty() {
            return Err(Error::invalid_config("no access key id specified"));
        }
        if self.access_key_secret.is_empty() {
            return Err(Error::invalid_config("no access key secret specified"));
        }
        if self.workers == Some(0) {
            return Err(Error::invalid_config("workers must be positive"));
        }
        Ok(())
    }
}

/// Identity of a datastore's on-disk layout: two configurations with equal
/// disk specs address the same objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    pub bucket: String,
    pub root_directory: String,
}

impl DiskSpec {
    /// Returns the spec as a JSON object.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "bucket": self.bucket,
            "rootDirectory": self.root_directory,
        })
    }
}

fn required_string(map: &Map<String, Value>, field: &str) -> Result<String> {
    map.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::invalid_config(format!("no {field} specified")))
}

fn optional_string(map: &Map<String, Value>, field: &str) -> Result<Option<String>> {
    match map.get(field) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(Error::invalid_config(format!("{field} not a string"))),
    }
}
