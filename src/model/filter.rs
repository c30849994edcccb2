//! The subscription predicate: `REQ`/`COUNT` carry one or more of these.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::event::Event;

/// `#<letter>` tag filters, e.g. `{"e": ["abc"], "p": ["def"]}`.
pub type TagMap = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "TagMap::is_empty")]
    pub tags: TagMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// Wire-format filters carry tag clauses as sibling `#<letter>` keys rather
/// than a nested `tags` object, so a derived `Deserialize` over `Filter`
/// directly would miss them. Deserialize into this shape first and fold the
/// `#`-prefixed keys into `tags`.
#[derive(Deserialize)]
struct RawFilter {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    kinds: Vec<i64>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    since: Option<i64>,
    #[serde(default)]
    until: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    search: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawFilter::deserialize(deserializer)?;
        let mut tags = TagMap::new();
        for (key, value) in raw.extra {
            let mut chars = key.chars();
            if chars.next() != Some('#') {
                continue;
            }
            let tag_key: String = chars.collect();
            if tag_key.is_empty() {
                continue;
            }
            if let Some(values) = value.as_array() {
                let values: Vec<String> = values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                tags.insert(tag_key, values);
            }
        }
        Ok(Filter {
            ids: raw.ids,
            kinds: raw.kinds,
            authors: raw.authors,
            tags,
            since: raw.since,
            until: raw.until,
            limit: raw.limit,
            search: raw.search,
        })
    }
}

impl Filter {
    /// A filter with every clause empty matches nothing meaningful; the
    /// default policy rejects it outright (§4.5).
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.kinds.is_empty()
            && self.authors.is_empty()
            && self.tags.is_empty()
            && self.since.is_none()
            && self.limit.is_none()
            && self.search.as_deref().unwrap_or("").is_empty()
    }

    /// In-memory match against a single event, used by the session to
    /// decide whether a freshly-ingested event should fan out to a live
    /// subscription without a round trip to the store.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| id == &event.id) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.iter().any(|a| a == &event.pubkey) {
            return false;
        }
        if self.since.map(|s| event.created_at < s).unwrap_or(false) {
            return false;
        }
        if self.until.map(|u| event.created_at > u).unwrap_or(false) {
            return false;
        }
        if !self.tags.is_empty() {
            let values = event.tags.tagvalues();
            let wants_any = self.tags.values().flatten().any(|v| values.contains(v));
            if !wants_any {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            if !event.content.contains(search) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub filters: Vec<Filter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tag::{Tag, Tags};

    fn event(kind: i64, pubkey: &str, created_at: i64) -> Event {
        Event {
            id: "e".repeat(64),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags: Tags::default(),
            content: "hello world".into(),
            sig: String::new(),
            expiration: None,
            deleted_at: None,
            updated_at: None,
            updated_ip: None,
        }
    }

    #[test]
    fn empty_filter_is_empty() {
        assert!(Filter::default().is_empty());
        let f = Filter { limit: Some(10), ..Default::default() };
        assert!(!f.is_empty());
    }

    #[test]
    fn matches_requires_every_nonempty_clause() {
        let evt = event(1, &"a".repeat(64), 1000);
        let f = Filter { kinds: vec![1], authors: vec!["a".repeat(64)], ..Default::default() };
        assert!(f.matches(&evt));

        let f2 = Filter { kinds: vec![2], ..Default::default() };
        assert!(!f2.matches(&evt));
    }

    #[test]
    fn matches_since_and_until() {
        let evt = event(1, &"a".repeat(64), 1000);
        assert!(Filter { since: Some(999), ..Default::default() }.matches(&evt));
        assert!(!Filter { since: Some(1001), ..Default::default() }.matches(&evt));
        assert!(Filter { until: Some(1000), ..Default::default() }.matches(&evt));
        assert!(!Filter { until: Some(999), ..Default::default() }.matches(&evt));
    }

    #[test]
    fn deserialize_folds_hash_prefixed_keys_into_tags() {
        let v: serde_json::Value = serde_json::json!({
            "kinds": [1],
            "#e": ["abc", "def"],
            "#p": ["ghi"],
        });
        let f: Filter = serde_json::from_value(v).unwrap();
        assert_eq!(f.kinds, vec![1]);
        assert_eq!(f.tags.get("e").unwrap(), &vec!["abc".to_string(), "def".to_string()]);
        assert_eq!(f.tags.get("p").unwrap(), &vec!["ghi".to_string()]);
    }

    #[test]
    fn matches_tags_via_tagvalues_overlap() {
        let mut evt = event(1, &"a".repeat(64), 1000);
        evt.tags = Tags(vec![Tag(vec!["e".into(), "target".into()])]);
        let mut tags = TagMap::new();
        tags.insert("e".to_string(), vec!["target".to_string()]);
        assert!(Filter { tags, ..Default::default() }.matches(&evt));

        let mut tags2 = TagMap::new();
        tags2.insert("e".to_string(), vec!["other".to_string()]);
        assert!(!Filter { tags: tags2, ..Default::default() }.matches(&evt));
    }
}
