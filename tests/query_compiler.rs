//! Integration coverage for the filter-to-SQL compiler: exercises the
//! predicate set and limit resolution together rather than unit-testing
//! `compile`/`resolve_limit` in isolation (see `src/query.rs` for those).

use reraw_relay::model::Filter;
use reraw_relay::query::{self, QueryOptions};
use std::collections::HashMap;

#[test]
fn full_filter_compiles_every_predicate_with_one_limit_clause() {
    let mut tags = HashMap::new();
    tags.insert("e".to_string(), vec!["deadbeef".to_string()]);
    tags.insert("p".to_string(), vec!["cafebabe".to_string()]);

    let filter = Filter {
        ids: vec!["a".repeat(64)],
        kinds: vec![1, 7],
        authors: vec!["b".repeat(64)],
        tags,
        since: Some(1_700_000_000),
        until: Some(1_700_100_000),
        limit: Some(25),
        search: Some("hello".to_string()),
    };

    let qb = query::compile(&filter, &QueryOptions::default(), 100, 1_700_200_000);
    let sql = qb.sql();

    for clause in [
        "deleted_at IS NULL",
        "expiration IS NULL OR expiration",
        "id = ANY",
        "kind = ANY",
        "pubkey = ANY",
        "created_at >=",
        "created_at <=",
        "content LIKE",
        "tagvalues &&",
        "ORDER BY created_at DESC, id ASC",
        "LIMIT",
    ] {
        assert!(sql.contains(clause), "missing clause `{clause}` in: {sql}");
    }
    assert_eq!(sql.matches("LIMIT").count(), 1, "explicit filter limit must not double up with max_limit clamping");
}

#[test]
fn no_limit_option_suppresses_limit_even_with_explicit_filter_limit() {
    let filter = Filter { limit: Some(10), ..Default::default() };
    let opts = QueryOptions { count: false, no_limit: true };
    let qb = query::compile(&filter, &opts, 500, 0);
    assert!(!qb.sql().contains("LIMIT"), "janitor/duplicate-check reads must never be truncated");
}

#[test]
fn count_query_drops_ordering_and_projection() {
    let filter = Filter { kinds: vec![1], ..Default::default() };
    let opts = QueryOptions { count: true, no_limit: false };
    let qb = query::compile(&filter, &opts, 500, 0);
    let sql = qb.sql();
    assert!(sql.starts_with("SELECT COUNT(1) FROM events WHERE"));
    assert!(!sql.contains("ORDER BY"));
    assert!(!sql.contains("LIMIT"), "count ignores max_limit regardless of filter shape");
}

#[test]
fn count_query_drops_limit_even_when_filter_carries_an_explicit_one() {
    // A COUNT whose filter sets its own `limit` (e.g. ["COUNT","s",{"kinds":[1],"limit":5}])
    // must still never produce a LIMIT clause (§4.7).
    let filter = Filter { kinds: vec![1], limit: Some(5), ..Default::default() };
    let opts = QueryOptions { count: true, no_limit: false };
    let qb = query::compile(&filter, &opts, 500, 0);
    assert!(!qb.sql().contains("LIMIT"));
}

#[test]
fn bare_filter_without_since_is_clamped_below_configured_max_limit() {
    // info.max_limit=500 but no `since` clause present: resolve_limit clamps
    // to the small no-since default to avoid an unbounded table scan.
    let filter = Filter::default();
    let limit = query::resolve_limit(&filter, &QueryOptions::default(), 500);
    assert_eq!(limit, Some(query::NO_SINCE_DEFAULT_LIMIT));

    let filter_with_since = Filter { since: Some(1), ..Default::default() };
    let limit = query::resolve_limit(&filter_with_since, &QueryOptions::default(), 500);
    assert_eq!(limit, Some(500));
}
