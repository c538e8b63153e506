//! Stream of query results handed out by the datastore.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};

use super::{Entry, ListingIterator, Query, QueryResult};
use crate::Result;

/// Results of a [`Query`], stopping after the query's limit.
///
/// An error result ends the stream.
pub struct QueryResults {
    query: Query,
    inner: BoxStream<'static, QueryResult>,
    yielded: usize,
    closed: bool,
}

impl QueryResults {
    pub(crate) fn new(query: Query, iterator: ListingIterator) -> Self {
        Self {
            query,
            inner: iterator.into_stream(),
            yielded: 0,
            closed: false,
        }
    }

    /// The query these results answer.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Stops the stream. Calling it again has no effect.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner = stream::empty().boxed();
        }
    }

    /// Collects every remaining entry; the first error aborts.
    pub async fn rest(mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(result) = self.next().await {
            entries.push(result?);
        }
        Ok(entries)
    }

    fn exhausted(&self) -> bool {
        self.closed || self.query.limit.is_some_and(|limit| self.yielded >= limit)
    }
}

impl Stream for QueryResults {
    type Item = QueryResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.exhausted() {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(result)) => {
                this.yielded += 1;
                Poll::Ready(Some(result))
            }
            Poll::Ready(None) => {
                this.close();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for QueryResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResults")
            .field("query", &self.query)
            .field("yielded", &self.yielded)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::KeyMapper;
    use crate::mock::MemoryBucket;

    async fn results(bucket: &Arc<MemoryBucket>, query: Query) -> QueryResults {
        let iterator = ListingIterator::start(bucket.clone(), KeyMapper::default(), &query)
            .await
            .unwrap();
        QueryResults::new(query, iterator)
    }

    fn populated(count: usize) -> Arc<MemoryBucket> {
        let bucket = Arc::new(MemoryBucket::new());
        for i in 0..count {
            bucket.insert(format!("/q/{i:02}"), Bytes::from("x"));
        }
        bucket
    }

    #[tokio::test]
    async fn limit_is_enforced() {
        let bucket = populated(10);
        let entries = results(&bucket, Query::new("/q").keys_only().with_limit(4))
            .await
            .rest()
            .await
            .unwrap();
        assert_eq!(entries.len(), 4);
    }

    #[tokio::test]
    async fn close_ends_stream() {
        let bucket = populated(10);
        let mut results = results(&bucket, Query::new("/q").keys_only()).await;

        assert!(results.next().await.is_some());
        results.close();
        results.close();
        assert!(results.next().await.is_none());
    }

    #[tokio::test]
    async fn rest_stops_at_first_error() {
        let bucket = populated(3);
        bucket.fail_get("/q/01");

        let err = results(&bucket, Query::new("/q")).await.rest().await.unwrap_err();
        assert!(matches!(err, crate::Error::Bucket(_)));
    }
}
