//! The narrow persistence contract the engine consumes (§4.9). A concrete
//! store is a relational database today; other engines (LSM, in-memory)
//! satisfy the same contract without leaking SQL types across the
//! boundary, per SPEC_FULL §9 "Store abstraction".

pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Blacklist, BlacklistFilter, Event, Filter};
use crate::query::QueryOptions;

pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Event>, StoreError>;
    /// `max_limit` is the active `info.limitation.max_limit`; ignored when
    /// `opts.no_limit` is set or the filter carries its own explicit limit.
    async fn find_all(&self, filter: &Filter, opts: QueryOptions, max_limit: i64) -> Result<Vec<Event>, StoreError>;
    async fn count(&self, filter: &Filter) -> Result<i64, StoreError>;
    /// Inserts a row, deriving `tagvalues` from `event.tags`.
    async fn insert(&self, event: &Event, now: i64) -> Result<(), StoreError>;
    async fn soft_delete(&self, id: &str, now: i64) -> Result<(), StoreError>;
    async fn hard_delete(&self, id: &str) -> Result<(), StoreError>;
    /// Upsert, append-idempotent per pubkey.
    async fn insert_blacklist(&self, pubkey: &str, now: i64) -> Result<(), StoreError>;
    async fn find_blacklists(&self, filter: &BlacklistFilter) -> Result<Vec<Blacklist>, StoreError>;
    async fn find_expired_events(&self, now: i64) -> Result<Vec<Event>, StoreError>;
}

/// A no-op [`Store`] for unit tests of callers that only need the trait
/// object to exist, not to hold real data.
#[cfg(test)]
pub mod tests_support {
    use super::*;

    pub struct NullStore;

    #[async_trait]
    impl Store for NullStore {
        async fn find_by_id(&self, _id: &str) -> Result<Option<Event>, StoreError> {
            Ok(None)
        }
        async fn find_all(&self, _filter: &Filter, _opts: QueryOptions, _max_limit: i64) -> Result<Vec<Event>, StoreError> {
            Ok(Vec::new())
        }
        async fn count(&self, _filter: &Filter) -> Result<i64, StoreError> {
            Ok(0)
        }
        async fn insert(&self, _event: &Event, _now: i64) -> Result<(), StoreError> {
            Ok(())
        }
        async fn soft_delete(&self, _id: &str, _now: i64) -> Result<(), StoreError> {
            Ok(())
        }
        async fn hard_delete(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn insert_blacklist(&self, _pubkey: &str, _now: i64) -> Result<(), StoreError> {
            Ok(())
        }
        async fn find_blacklists(&self, _filter: &BlacklistFilter) -> Result<Vec<Blacklist>, StoreError> {
            Ok(Vec::new())
        }
        async fn find_expired_events(&self, _now: i64) -> Result<Vec<Event>, StoreError> {
            Ok(Vec::new())
        }
    }
}
