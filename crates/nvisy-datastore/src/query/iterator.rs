//! Forward-only cursor over a paginated bucket listing.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;

use super::{Entry, Query, QueryResult};
use crate::bucket::{Bucket, ListPage, ListRequest};
use crate::datastore::fetch_value;
use crate::{Key, KeyMapper, LIST_MAX, Result, TRACING_TARGET_QUERY};

/// Lazily walks a bucket listing, issuing continuation calls as pages run out.
///
/// The cursor starts `offset` objects into the listing. Objects outside the
/// root directory or the query prefix are skipped. The first failed
/// continuation or value fetch is yielded once, after which the iterator is
/// exhausted.
pub struct ListingIterator {
    bucket: Arc<dyn Bucket>,
    mapper: KeyMapper,
    prefix: Key,
    remote_prefix: String,
    keys_only: bool,
    page: ListPage,
    index: usize,
    done: bool,
}

impl ListingIterator {
    /// Validates `query` and fetches the first page.
    pub(crate) async fn start(
        bucket: Arc<dyn Bucket>,
        mapper: KeyMapper,
        query: &Query,
    ) -> Result<Self> {
        query.validate()?;

        let prefix = query.prefix_key();
        let remote_prefix = mapper.to_remote_prefix(prefix.as_str());
        let page_size = query.first_page_size(LIST_MAX);

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            prefix = %prefix,
            remote_prefix = %remote_prefix,
            page_size,
            offset = query.offset,
            keys_only = query.keys_only,
            "Starting listing"
        );

        let page = bucket
            .list_objects(ListRequest::new(remote_prefix.clone(), page_size))
            .await?;

        Ok(Self {
            bucket,
            mapper,
            prefix,
            remote_prefix,
            keys_only: query.keys_only,
            page,
            index: query.offset,
            done: false,
        })
    }

    /// Returns the next entry, or `None` once the listing is exhausted.
    pub async fn next_entry(&mut self) -> Option<QueryResult> {
        loop {
            if self.done {
                return None;
            }

            while self.index >= self.page.len() {
                if !self.page.is_truncated {
                    self.done = true;
                    return None;
                }

                self.index -= self.page.len();
                if let Err(error) = self.fetch_next_page().await {
                    tracing::warn!(
                        target: TRACING_TARGET_QUERY,
                        prefix = %self.prefix,
                        error = %error,
                        "Listing continuation failed"
                    );
                    self.done = true;
                    return Some(Err(error));
                }
            }

            let object = &self.page.objects[self.index];
            self.index += 1;

            if !self.mapper.contains(&object.name) {
                continue;
            }

            let key = self.mapper.to_key(&object.name);
            if !self.prefix.is_root() && !key.is_descendant_of(&self.prefix) {
                continue;
            }

            let size = object.size;
            let value = if self.keys_only {
                None
            } else {
                match fetch_value(self.bucket.as_ref(), &self.mapper, &key).await {
                    Ok(value) => Some(value),
                    Err(error) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                }
            };

            return Some(Ok(Entry { key, size, value }));
        }
    }

    /// Stops the iterator; later calls to [`next_entry`](Self::next_entry)
    /// return `None`. Calling it again has no effect.
    pub fn close(&mut self) {
        self.done = true;
    }

    /// Turns the iterator into a stream of results.
    pub fn into_stream(self) -> BoxStream<'static, QueryResult> {
        futures::stream::unfold(self, |mut iterator| async move {
            let next = iterator.next_entry().await?;
            Some((next, iterator))
        })
        .boxed()
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        let mut request = ListRequest::new(self.remote_prefix.clone(), LIST_MAX);
        if let Some(marker) = self.page.next_marker.clone() {
            request = request.with_marker(marker);
        }

        self.page = self.bucket.list_objects(request).await?;
        tracing::trace!(
            target: TRACING_TARGET_QUERY,
            objects = self.page.len(),
            truncated = self.page.is_truncated,
            "Fetched listing page"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ListingIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingIterator")
            .field("bucket", &self.bucket.name())
            .field("prefix", &self.prefix)
            .field("index", &self.index)
            .field("page_len", &self.page.len())
            .field("done", &self.done)
            .finish()
    }
}
