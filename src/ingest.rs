//! Ingest engine (§4.6): replaceable/parameterized-replaceable/ephemeral
//! lifecycle, duplicate check, insert, NIP-09 soft delete. A direct port of
//! the Go original's `relay/handlers.go` `onEvent`/`clearEventOlder` and
//! `pgk/nips/nip09/service.go` `CancelEvent`, restructured as a single
//! `ingest` call the session awaits instead of a sequence of reject-hook
//! slices mutated at upgrade time.

use std::sync::Arc;

use crate::config::Config;
use crate::error::IngestError;
use crate::model::{event::{is_ephemeral_kind, is_param_replaceable_kind, is_replaceable_kind}, Event, Filter, TagMap};
use crate::policy::Policy;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Not persisted; caller still fans it out to live subscribers.
    Ephemeral,
    Stored,
    Duplicate,
}

/// One NIP-09 delete target and whether it was refused for being authored
/// by someone else (§4.6 step 7: the outer event is still accepted).
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub target_id: String,
    pub forbidden: bool,
}

pub async fn ingest(
    mut event: Event,
    policy: &Policy,
    store: &Arc<dyn Store>,
    config: &Config,
    client_ip: Option<String>,
    now: i64,
) -> Result<(IngestOutcome, Vec<DeleteOutcome>), IngestError> {
    policy.reject_event(&event, config, now).await?;

    if is_ephemeral_kind(event.kind) {
        return Ok((IngestOutcome::Ephemeral, Vec::new()));
    }

    sweep_older(&event, store).await?;

    if store.find_by_id(&event.id).await?.is_some() {
        return Ok((IngestOutcome::Duplicate, Vec::new()));
    }

    policy.store_event(&event, config, now).await?;

    event.expiration = resolve_expiration(&event)?;
    event.updated_ip = client_ip;
    store.insert(&event, now).await?;

    let deletes = if event.kind == 5 {
        cancel_referenced_events(&event, store, now).await?
    } else {
        Vec::new()
    };

    Ok((IngestOutcome::Stored, deletes))
}

async fn sweep_older(event: &Event, store: &Arc<dyn Store>) -> Result<(), IngestError> {
    let sweep_filter = if is_replaceable_kind(event.kind) {
        Filter { authors: vec![event.pubkey.clone()], kinds: vec![event.kind], ..Default::default() }
    } else if is_param_replaceable_kind(event.kind) {
        let d_value = event
            .tags
            .find_first("d")
            .map(|t| t.value().to_string())
            .ok_or(IngestError::MissingDTag)?;
        let mut tags = TagMap::new();
        tags.insert("d".to_string(), vec![d_value]);
        Filter { authors: vec![event.pubkey.clone()], kinds: vec![event.kind], tags, ..Default::default() }
    } else {
        return Ok(());
    };

    let candidates = store
        .find_all(&sweep_filter, crate::query::QueryOptions { count: false, no_limit: true }, 0)
        .await?;
    for previous in candidates {
        if previous.is_older_than(event) {
            store.hard_delete(&previous.id).await?;
        }
    }
    Ok(())
}

/// NIP-40: an `expiration` tag under 100 is rejected outright; absent tag
/// leaves `expiration` unset.
fn resolve_expiration(event: &Event) -> Result<Option<i64>, IngestError> {
    let Some(tag) = event.tags.find_first("expiration") else {
        return Ok(None);
    };
    let raw = tag.value();
    if raw.is_empty() {
        return Err(IngestError::InvalidExpiration);
    }
    let value: i64 = raw.parse().map_err(|_| IngestError::InvalidExpiration)?;
    if value < 100 {
        return Err(IngestError::InvalidExpiration);
    }
    Ok(Some(value))
}

/// NIP-09: soft-deletes every event referenced by an `e` tag (optionally
/// narrowed by `k` tag kind hints) that the deleting pubkey actually
/// authored, plus every parameterized-replaceable event named by an `a` tag
/// coordinate (`kind:pubkey:d`). Events by other authors are reported, not
/// deleted.
async fn cancel_referenced_events(
    event: &Event,
    store: &Arc<dyn Store>,
    now: i64,
) -> Result<Vec<DeleteOutcome>, IngestError> {
    let mut outcomes = Vec::new();
    outcomes.extend(cancel_e_tag_targets(event, store, now).await?);
    outcomes.extend(cancel_a_tag_targets(event, store, now).await?);
    Ok(outcomes)
}

async fn cancel_e_tag_targets(event: &Event, store: &Arc<dyn Store>, now: i64) -> Result<Vec<DeleteOutcome>, IngestError> {
    let ids: Vec<String> = event
        .tags
        .find_all("e")
        .filter(|t| !t.value().is_empty())
        .map(|t| t.value().to_string())
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let kinds: Vec<i64> = event.tags.find_all("k").filter_map(|t| t.value().parse::<i64>().ok()).collect();

    let mut outcomes = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(target) = store.find_by_id(&id).await? else {
            continue;
        };
        if !kinds.is_empty() && !kinds.contains(&target.kind) {
            continue;
        }
        if target.pubkey != event.pubkey {
            outcomes.push(DeleteOutcome { target_id: id, forbidden: true });
            continue;
        }
        store.soft_delete(&id, now).await?;
        outcomes.push(DeleteOutcome { target_id: id, forbidden: false });
    }
    Ok(outcomes)
}

/// Each `a` tag carries a parameterized-replaceable coordinate
/// `<kind>:<pubkey>:<d-value>`. The embedded pubkey, not a store lookup,
/// decides authorship — it names the event before it's fetched.
async fn cancel_a_tag_targets(event: &Event, store: &Arc<dyn Store>, now: i64) -> Result<Vec<DeleteOutcome>, IngestError> {
    let mut outcomes = Vec::new();
    for tag in event.tags.find_all("a") {
        let coordinate = tag.value();
        let mut parts = coordinate.splitn(3, ':');
        let (Some(kind_str), Some(pubkey), Some(d_value)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let Ok(kind) = kind_str.parse::<i64>() else { continue };
        if pubkey != event.pubkey {
            outcomes.push(DeleteOutcome { target_id: coordinate.to_string(), forbidden: true });
            continue;
        }

        let mut tags = TagMap::new();
        tags.insert("d".to_string(), vec![d_value.to_string()]);
        let filter = Filter { authors: vec![pubkey.to_string()], kinds: vec![kind], tags, ..Default::default() };
        let matches = store
            .find_all(&filter, crate::query::QueryOptions { count: false, no_limit: true }, 0)
            .await?;
        for target in matches {
            store.soft_delete(&target.id, now).await?;
            outcomes.push(DeleteOutcome { target_id: target.id, forbidden: false });
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Tag, Tags};

    fn base_event(kind: i64, pubkey: &str) -> Event {
        Event {
            id: "e".repeat(64),
            pubkey: pubkey.to_string(),
            created_at: 1_700_000_000,
            kind,
            tags: Tags::default(),
            content: String::new(),
            sig: String::new(),
            expiration: None,
            deleted_at: None,
            updated_at: None,
            updated_ip: None,
        }
    }

    #[test]
    fn resolve_expiration_rejects_small_values() {
        let mut evt = base_event(1, &"a".repeat(64));
        evt.tags = Tags(vec![Tag(vec!["expiration".into(), "42".into()])]);
        assert!(matches!(resolve_expiration(&evt), Err(IngestError::InvalidExpiration)));

        evt.tags = Tags(vec![Tag(vec!["expiration".into(), "100".into()])]);
        assert_eq!(resolve_expiration(&evt).unwrap(), Some(100));
    }

    #[test]
    fn resolve_expiration_absent_tag_is_none() {
        let evt = base_event(1, &"a".repeat(64));
        assert_eq!(resolve_expiration(&evt).unwrap(), None);
    }

    #[tokio::test]
    async fn cancel_a_tag_targets_refuses_foreign_coordinate() {
        let store: Arc<dyn Store> = Arc::new(crate::store::tests_support::NullStore);
        let author = "a".repeat(64);
        let other = "b".repeat(64);
        let mut evt = base_event(5, &author);
        evt.tags = Tags(vec![Tag(vec!["a".into(), format!("30023:{other}:article-1")])]);

        let outcomes = cancel_a_tag_targets(&evt, &store, 1_700_000_100).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].forbidden);
        assert_eq!(outcomes[0].target_id, format!("30023:{other}:article-1"));
    }

    #[tokio::test]
    async fn cancel_a_tag_targets_ignores_malformed_coordinate() {
        let store: Arc<dyn Store> = Arc::new(crate::store::tests_support::NullStore);
        let mut evt = base_event(5, &"a".repeat(64));
        evt.tags = Tags(vec![Tag(vec!["a".into(), "not-a-coordinate".into()])]);

        let outcomes = cancel_a_tag_targets(&evt, &store, 1_700_000_100).await.unwrap();
        assert!(outcomes.is_empty());
    }
}
