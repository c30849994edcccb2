//! Ordered hook pipeline (§4.5): `rejectConnection`, `rejectEvent`,
//! `rejectFilter`, `storeEvent`. Grounded on the Go original's
//! `pgk/policies/service_event.go` hook bodies and their composition order
//! in `relay/relay.go`'s `handleMessage` (`RejectValidateEvent` →
//! `RejectValidatePow` → `RejectValidateTimeStamp` → `RejectEventWithCharacter`
//! → `RejectEventFromPubkeyWithBlacklist`, then `StoreBlacklistWithContent`
//! after acceptance). Here the validator folds the first four checks; this
//! module adds the store-backed ones the validator cannot do alone.

use std::sync::Arc;

use crate::config::Config;
use crate::error::IngestError;
use crate::model::{BlacklistFilter, Event, Filter};
use crate::store::Store;
use crate::validator;

/// Content substrings that, once seen from a pubkey, auto-enroll it in the
/// blacklist on future sweeps. Mirrors the Go original's hardcoded list in
/// `StoreBlacklistWithContent`; kept as a config knob here instead
/// (`info.limitation.content_blocklist` doubles as both the reject-list and
/// the auto-blacklist trigger list, since the source conflates the two).
pub struct Policy {
    store: Arc<dyn Store>,
}

impl Policy {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Policy { store }
    }

    /// Runs on HTTP upgrade. `user_agent` empty → reject (§4.1).
    pub fn reject_connection(&self, user_agent: Option<&str>) -> bool {
        user_agent.map(str::trim).unwrap_or("").is_empty()
    }

    /// Runs on each filter in REQ/COUNT; an all-empty filter is rejected.
    pub fn reject_filter(&self, filter: &Filter) -> Option<&'static str> {
        if filter.is_empty() {
            Some("blocked: can't handle empty filters")
        } else {
            None
        }
    }

    /// Runs on EVENT before storage: id/sig/bounds/PoW/drift/content-blocklist
    /// via the validator, then a blacklist lookup by author.
    pub async fn reject_event(&self, event: &Event, config: &Config, now: i64) -> Result<(), IngestError> {
        if config.info.limitation.restricted_writes {
            return Err(IngestError::RestrictedWrites);
        }

        validator::validate(event, &config.info.limitation, now)?;

        let hits = self
            .store
            .find_blacklists(&BlacklistFilter { pubkey: Some(event.pubkey.clone()) })
            .await?;
        if !hits.is_empty() {
            return Err(IngestError::Blacklisted);
        }
        Ok(())
    }

    /// Runs after validation, before commit: side effects only. Auto-enrolls
    /// an author whose content matches the blocklist, so future submissions
    /// are rejected at `reject_event` and the janitor purges their history.
    pub async fn store_event(&self, event: &Event, config: &Config, now: i64) -> Result<(), IngestError> {
        let hit = config
            .info
            .limitation
            .content_blocklist
            .iter()
            .any(|needle| event.content.contains(needle.as_str()));
        if hit {
            self.store.insert_blacklist(&event.pubkey, now).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Filter;

    #[test]
    fn reject_connection_requires_user_agent() {
        let store: Arc<dyn Store> = Arc::new(crate::store::tests_support::NullStore);
        let policy = Policy::new(store);
        assert!(policy.reject_connection(None));
        assert!(policy.reject_connection(Some("  ")));
        assert!(!policy.reject_connection(Some("nostr-client/1.0")));
    }

    fn sample_event() -> Event {
        Event {
            id: "e".repeat(64),
            pubkey: "a".repeat(64),
            created_at: 1_700_000_000,
            kind: 1,
            tags: crate::model::Tags::default(),
            content: String::new(),
            sig: String::new(),
            expiration: None,
            deleted_at: None,
            updated_at: None,
            updated_ip: None,
        }
    }

    #[tokio::test]
    async fn reject_event_refuses_everything_when_restricted() {
        let store: Arc<dyn Store> = Arc::new(crate::store::tests_support::NullStore);
        let policy = Policy::new(store);
        let mut config = Config::default();
        config.info.limitation.restricted_writes = true;

        let err = policy.reject_event(&sample_event(), &config, 1_700_000_000).await.unwrap_err();
        assert!(matches!(err, IngestError::RestrictedWrites));
    }

    #[test]
    fn reject_filter_flags_empty_filter() {
        let store: Arc<dyn Store> = Arc::new(crate::store::tests_support::NullStore);
        let policy = Policy::new(store);
        assert!(policy.reject_filter(&Filter::default()).is_some());
        let f = Filter { limit: Some(1), ..Default::default() };
        assert!(policy.reject_filter(&f).is_none());
    }
}
