//! Filter → SQL compiler (§4.7). Builds a parameterized query against the
//! `events` table using `sqlx::QueryBuilder`, leaning on Postgres's native
//! array binding (`= ANY($1)`, `tagvalues && $1`) rather than hand-expanded
//! placeholder lists — the same predicates the Go original's raw-SQL
//! `query()` builds, expressed without string-concatenated parameter
//! counts.

use sqlx::{Postgres, QueryBuilder};

use crate::model::Filter;

/// Read queries fall back to this limit when the caller gave none and the
/// filter has no `since`, to avoid an unbounded table scan (§4.7 step 2).
pub const NO_SINCE_DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub count: bool,
    pub no_limit: bool,
}

const EVENT_COLUMNS: &str =
    "id, created_at, pubkey, kind, tags, content, sig, expiration, updated_ip, updated_at, deleted_at";

/// Resolves the effective `LIMIT` per §4.7: COUNT and janitor (`no_limit`)
/// callers never get a `LIMIT` clause at all, regardless of what the filter
/// requests — fixing the source's inconsistent clamp between count and read
/// paths (SPEC_FULL §9 Open Questions). Otherwise an explicit filter limit
/// wins; failing that, non-count reads fall back to `max_limit`, clamped
/// further to [`NO_SINCE_DEFAULT_LIMIT`] when the filter has no `since`.
pub fn resolve_limit(filter: &Filter, opts: &QueryOptions, max_limit: i64) -> Option<i64> {
    if opts.no_limit || opts.count {
        return None;
    }
    if let Some(limit) = filter.limit.filter(|l| *l > 0) {
        return Some(limit);
    }
    if max_limit > 0 {
        if filter.since.is_none() {
            return Some(NO_SINCE_DEFAULT_LIMIT);
        }
        return Some(max_limit);
    }
    None
}

fn escape_like(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Builds the compiled query. `now` bounds the expiration predicate;
/// `max_limit` is `info.limitation.max_limit` from the active config
/// snapshot.
pub fn compile(filter: &Filter, opts: &QueryOptions, max_limit: i64, now: i64) -> QueryBuilder<'static, Postgres> {
    let mut qb: QueryBuilder<Postgres> = if opts.count {
        QueryBuilder::new("SELECT COUNT(1) FROM events WHERE ")
    } else {
        QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE "))
    };

    qb.push("deleted_at IS NULL");
    qb.push(" AND (expiration IS NULL OR expiration >= ");
    qb.push_bind(now);
    qb.push(")");

    if !filter.ids.is_empty() {
        qb.push(" AND id = ANY(");
        qb.push_bind(filter.ids.clone());
        qb.push(")");
    }
    if !filter.kinds.is_empty() {
        qb.push(" AND kind = ANY(");
        qb.push_bind(filter.kinds.clone());
        qb.push(")");
    }
    if !filter.authors.is_empty() {
        qb.push(" AND pubkey = ANY(");
        qb.push_bind(filter.authors.clone());
        qb.push(")");
    }
    if let Some(since) = filter.since {
        qb.push(" AND created_at >= ");
        qb.push_bind(since);
    }
    if let Some(until) = filter.until {
        qb.push(" AND created_at <= ");
        qb.push_bind(until);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND content LIKE ");
        qb.push_bind(format!("%{}%", escape_like(search)));
    }

    let tag_values: Vec<String> = filter.tags.values().flatten().cloned().collect();
    if !tag_values.is_empty() {
        qb.push(" AND tagvalues && ");
        qb.push_bind(tag_values);
    }

    if !opts.count {
        qb.push(" ORDER BY created_at DESC, id ASC");
    }

    if let Some(limit) = resolve_limit(filter, opts, max_limit) {
        qb.push(" LIMIT ");
        qb.push_bind(limit);
    }

    qb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_limit_prefers_explicit_filter_limit() {
        let f = Filter { limit: Some(7), ..Default::default() };
        assert_eq!(resolve_limit(&f, &QueryOptions::default(), 100), Some(7));
    }

    #[test]
    fn resolve_limit_count_path_never_clamped_by_max_limit() {
        let f = Filter::default();
        let opts = QueryOptions { count: true, no_limit: false };
        assert_eq!(resolve_limit(&f, &opts, 100), None);
    }

    #[test]
    fn resolve_limit_count_ignores_an_explicit_filter_limit_too() {
        // COUNT never emits a LIMIT (§4.7), even when the filter itself
        // carries an explicit limit.
        let f = Filter { limit: Some(5), ..Default::default() };
        let opts = QueryOptions { count: true, no_limit: false };
        assert_eq!(resolve_limit(&f, &opts, 100), None);
    }

    #[test]
    fn resolve_limit_clamps_small_without_since() {
        let f = Filter::default();
        assert_eq!(
            resolve_limit(&f, &QueryOptions::default(), 500),
            Some(NO_SINCE_DEFAULT_LIMIT)
        );
    }

    #[test]
    fn resolve_limit_uses_max_limit_when_since_present() {
        let f = Filter { since: Some(1000), ..Default::default() };
        assert_eq!(resolve_limit(&f, &QueryOptions::default(), 500), Some(500));
    }

    #[test]
    fn resolve_limit_no_limit_option_wins() {
        let f = Filter { limit: Some(7), ..Default::default() };
        let opts = QueryOptions { count: false, no_limit: true };
        assert_eq!(resolve_limit(&f, &opts, 500), None);
    }

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
    }

    #[test]
    fn compile_includes_expected_clauses() {
        let f = Filter { kinds: vec![1], authors: vec!["abc".into()], ..Default::default() };
        let qb = compile(&f, &QueryOptions::default(), 100, 1_700_000_000);
        let sql = qb.sql();
        assert!(sql.contains("kind = ANY"));
        assert!(sql.contains("pubkey = ANY"));
        assert!(sql.contains("ORDER BY created_at DESC, id ASC"));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn compile_count_omits_order_by() {
        let f = Filter::default();
        let opts = QueryOptions { count: true, no_limit: false };
        let qb = compile(&f, &opts, 100, 0);
        assert!(!qb.sql().contains("ORDER BY"));
        assert!(qb.sql().starts_with("SELECT COUNT(1)"));
    }

    #[test]
    fn compile_count_omits_limit_even_with_explicit_filter_limit() {
        let f = Filter { kinds: vec![1], limit: Some(5), ..Default::default() };
        let opts = QueryOptions { count: true, no_limit: false };
        let qb = compile(&f, &opts, 100, 0);
        assert!(!qb.sql().contains("LIMIT"));
    }
}
