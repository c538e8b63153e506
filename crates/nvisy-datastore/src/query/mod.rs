//! Prefix queries over bucket listings.
//!
//! A [`Query`] selects every key under a prefix. The bucket listing protocol
//! only offers prefix scoping and marker continuation, so filters and orders
//! are rejected up front. Results are produced lazily by a
//! [`ListingIterator`] and handed out as a [`QueryResults`] stream.

mod iterator;
mod results;

use bytes::Bytes;
use derive_more::Display;

pub use self::iterator::ListingIterator;
pub use self::results::QueryResults;
use crate::{Error, Key, Result};

/// Result item yielded by a query.
pub type QueryResult = Result<Entry>;

/// A key matched by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Key of the stored value.
    pub key: Key,
    /// Size of the stored value in bytes.
    pub size: u64,
    /// The value, absent for keys-only queries.
    pub value: Option<Bytes>,
}

/// A predicate on query entries.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Filter {
    /// Key equals the given key.
    #[display("key == {_0}")]
    KeyEquals(Key),
    /// Key starts with the given string.
    #[display("key has prefix {_0}")]
    KeyPrefix(String),
    /// Value equals the given bytes.
    #[display("value == <{} bytes>", _0.len())]
    ValueEquals(Bytes),
}

/// A sort order for query entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Order {
    #[display("key ascending")]
    KeyAscending,
    #[display("key descending")]
    KeyDescending,
    #[display("value ascending")]
    ValueAscending,
    #[display("value descending")]
    ValueDescending,
}

/// Describes which keys a query returns and how many.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Only keys under this prefix are returned.
    pub prefix: String,
    /// Unsupported; any filter makes the query invalid.
    pub filters: Vec<Filter>,
    /// Unsupported; any order makes the query invalid.
    pub orders: Vec<Order>,
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
    /// Number of listed objects to skip.
    pub offset: usize,
    /// Return keys and sizes without fetching values.
    pub keys_only: bool,
}

impl Query {
    /// Creates a query for every key under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum number of entries.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of listed objects to skip.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Skips fetching values.
    #[must_use]
    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    /// Adds a filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds an order.
    #[must_use]
    pub fn with_order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    /// The prefix as a key.
    pub fn prefix_key(&self) -> Key {
        Key::new(&self.prefix)
    }

    /// Number of objects the first list call should ask for.
    ///
    /// `limit + offset`, capped at `list_max`; `list_max` when no limit is set
    /// or the sum is zero.
    pub(crate) fn first_page_size(&self, list_max: usize) -> usize {
        match self.limit {
            Some(limit) => match limit.saturating_add(self.offset) {
                0 => list_max,
                wanted => wanted.min(list_max),
            },
            None => list_max,
        }
    }

    /// Rejects what a bucket listing cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.filters.is_empty() || !self.orders.is_empty() {
            return Err(Error::invalid_query(
                "filters or orders are not supported",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LIST_MAX;

    #[test]
    fn test_first_page_size() {
        assert_eq!(Query::new("/").first_page_size(LIST_MAX), LIST_MAX);
        assert_eq!(Query::new("/").with_limit(10).first_page_size(LIST_MAX), 10);
        assert_eq!(
            Query::new("/").with_limit(10).with_offset(5).first_page_size(LIST_MAX),
            15
        );
        assert_eq!(Query::new("/").with_limit(0).first_page_size(LIST_MAX), LIST_MAX);
        assert_eq!(
            Query::new("/").with_limit(5000).first_page_size(LIST_MAX),
            LIST_MAX
        );
    }

    #[test]
    fn test_validate() {
        assert!(Query::new("/a").validate().is_ok());

        let err = Query::new("/a")
            .with_order(Order::KeyAscending)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));

        let err = Query::new("/a")
            .with_filter(Filter::KeyPrefix("/a/b".into()))
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(Filter::KeyEquals(Key::new("/a")).to_string(), "key == /a");
        assert_eq!(
            Filter::ValueEquals(Bytes::from("abc")).to_string(),
            "value == <3 bytes>"
        );
        assert_eq!(Order::KeyDescending.to_string(), "key descending");
    }
}
