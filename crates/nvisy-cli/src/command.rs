//! Datastore subcommands.

use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use clap::Subcommand;
use futures::StreamExt;
use nvisy_datastore::query::Query;
use nvisy_datastore::{Batching, BucketDatastore, Datastore, Key};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::TRACING_TARGET_COMMAND;

/// Operations on the datastore.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Store a value read from a file, or from stdin with `-`.
    Put {
        /// Key to store the value under.
        key: String,
        /// File holding the value.
        file: PathBuf,
    },
    /// Print the value stored under a key.
    Get {
        /// Key to read.
        key: String,
    },
    /// Report whether a key has a value.
    Has {
        /// Key to check.
        key: String,
    },
    /// Print the size in bytes of a stored value.
    Size {
        /// Key to inspect.
        key: String,
    },
    /// Remove keys in a single batch.
    Rm {
        /// Keys to remove.
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List keys under a prefix.
    Ls {
        /// Prefix to list under.
        #[arg(default_value = "/")]
        prefix: String,
        /// Number of listed objects to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Maximum number of entries to print.
        #[arg(long)]
        limit: Option<usize>,
        /// Print values next to keys.
        #[arg(long)]
        values: bool,
    },
}

impl Command {
    /// Runs the command against `store`, writing results to stdout.
    pub async fn execute(self, store: &BucketDatastore) -> anyhow::Result<()> {
        let mut stdout = tokio::io::stdout();

        match self {
            Self::Put { key, file } => {
                let key = Key::new(key);
                let value = read_input(&file).await?;
                tracing::debug!(
                    target: TRACING_TARGET_COMMAND,
                    key = %key,
                    size = value.len(),
                    "Storing value"
                );
                store
                    .put(&key, value)
                    .await
                    .with_context(|| format!("failed to put '{key}'"))?;
            }
            Self::Get { key } => {
                let key = Key::new(key);
                let value = store
                    .get(&key)
                    .await
                    .with_context(|| format!("failed to get '{key}'"))?;
                stdout.write_all(&value).await?;
            }
            Self::Has { key } => {
                let key = Key::new(key);
                let exists = store
                    .has(&key)
                    .await
                    .with_context(|| format!("failed to check '{key}'"))?;
                stdout.write_all(format!("{exists}\n").as_bytes()).await?;
            }
            Self::Size { key } => {
                let key = Key::new(key);
                let size = store
                    .get_size(&key)
                    .await
                    .with_context(|| format!("failed to get size of '{key}'"))?;
                stdout.write_all(format!("{size}\n").as_bytes()).await?;
            }
            Self::Rm { keys } => {
                let mut batch = store.batch();
                for key in &keys {
                    batch.delete(Key::new(key));
                }
                tracing::debug!(
                    target: TRACING_TARGET_COMMAND,
                    keys = batch.len(),
                    "Removing keys"
                );
                batch
                    .commit()
                    .await
                    .with_context(|| format!("failed to remove {} keys", keys.len()))?;
            }
            Self::Ls {
                prefix,
                offset,
                limit,
                values,
            } => {
                let mut query = Query::new(prefix).with_offset(offset);
                if let Some(limit) = limit {
                    query = query.with_limit(limit);
                }
                if !values {
                    query = query.keys_only();
                }

                let mut results = store.query(query).await.context("failed to start listing")?;
                while let Some(result) = results.next().await {
                    let entry = result.context("listing failed")?;
                    let line = match &entry.value {
                        Some(value) => format!(
                            "{}\t{}\t{}\n",
                            entry.key,
                            entry.size,
                            String::from_utf8_lossy(value)
                        ),
                        None => format!("{}\t{}\n", entry.key, entry.size),
                    };
                    stdout.write_all(line.as_bytes()).await?;
                }
                results.close();
            }
        }

        stdout.flush().await?;
        Ok(())
    }
}

/// Reads a value from `path`, or from stdin when `path` is `-`.
async fn read_input(path: &Path) -> anyhow::Result<Bytes> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("failed to read stdin")?;
        return Ok(Bytes::from(buf));
    }

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Bytes::from(data))
}
