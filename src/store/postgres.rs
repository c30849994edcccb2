//! Postgres-backed store. Schema and the `tags_to_tagvalues` generated
//! column are a direct port of the Go original's `core/sql/migration.go`;
//! `blacklists` is keyed by `pubkey` rather than a surrogate id, matching
//! §6's persisted-schema description.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::model::{Blacklist, BlacklistFilter, Event, Filter, Tags};
use crate::query::{self, QueryOptions};

pub struct PgStore {
    pool: PgPool,
}

const MIGRATIONS: &[&str] = &[
    r#"CREATE OR REPLACE FUNCTION tags_to_tagvalues(jsonb) RETURNS text[]
        AS 'SELECT array_agg(t->>1) FROM (SELECT jsonb_array_elements($1) AS t) s WHERE length(t->>0) = 1;'
        LANGUAGE SQL IMMUTABLE RETURNS NULL ON NULL INPUT;"#,
    r#"CREATE TABLE IF NOT EXISTS events (
        id varchar(64) NOT NULL PRIMARY KEY,
        created_at integer DEFAULT NULL,
        updated_at integer DEFAULT NULL,
        deleted_at integer DEFAULT NULL,
        pubkey varchar(64) DEFAULT NULL,
        kind integer DEFAULT NULL,
        tags jsonb DEFAULT NULL,
        content text DEFAULT NULL,
        sig text DEFAULT NULL,
        tagvalues text[] GENERATED ALWAYS AS (tags_to_tagvalues(tags)) STORED,
        expiration integer DEFAULT NULL,
        updated_ip text DEFAULT NULL
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_events_pubkey ON events (pubkey);",
    "CREATE INDEX IF NOT EXISTS idx_events_created_at ON events (created_at DESC);",
    "CREATE INDEX IF NOT EXISTS idx_events_deleted_at ON events (deleted_at);",
    "CREATE INDEX IF NOT EXISTS idx_events_kind ON events (kind);",
    "CREATE INDEX IF NOT EXISTS idx_events_tagvalues ON events USING gin (tagvalues);",
    "CREATE INDEX IF NOT EXISTS idx_events_expiration ON events (expiration);",
    r#"CREATE TABLE IF NOT EXISTS blacklists (
        pubkey varchar(64) NOT NULL PRIMARY KEY,
        created_at integer DEFAULT NULL,
        updated_at integer DEFAULT NULL,
        deleted_at integer DEFAULT NULL
    );"#,
];

impl PgStore {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_open_conns)
            .min_connections(cfg.max_idle_conns.min(cfg.max_open_conns))
            .max_lifetime(cfg.max_lifetime())
            .connect_with(cfg.connect_options())
            .await?;
        Ok(PgStore { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for stmt in MIGRATIONS {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<Event, StoreError> {
        let tags: Json<Tags> = row.try_get("tags")?;
        Ok(Event {
            id: row.try_get("id")?,
            pubkey: row.try_get("pubkey")?,
            created_at: row.try_get::<i32, _>("created_at")? as i64,
            kind: row.try_get::<i32, _>("kind")? as i64,
            tags: tags.0,
            content: row.try_get("content")?,
            sig: row.try_get("sig")?,
            expiration: row.try_get::<Option<i32>, _>("expiration")?.map(|v| v as i64),
            deleted_at: row.try_get::<Option<i32>, _>("deleted_at")?.map(|v| v as i64),
            updated_at: row.try_get::<Option<i32>, _>("updated_at")?.map(|v| v as i64),
            updated_ip: row.try_get("updated_ip")?,
        })
    }
}

#[async_trait]
impl super::Store for PgStore {
    /// Looks a row up by id regardless of soft-delete state: the duplicate
    /// check and the NIP-09 author check both need to see a row that was
    /// already deleted (invariant 2 names both as exceptions to the
    /// `deleted_at` visibility rule), unlike the filter-driven reads in
    /// [`Store::find_all`].
    async fn find_by_id(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(
            "SELECT id, created_at, pubkey, kind, tags, content, sig, expiration, updated_ip, updated_at, deleted_at
             FROM events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_event).transpose()
    }

    async fn find_all(&self, filter: &Filter, opts: QueryOptions, max_limit: i64) -> Result<Vec<Event>, StoreError> {
        let now = crate::time::now_secs();
        let qb = query::compile(filter, &opts, max_limit, now);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn count(&self, filter: &Filter) -> Result<i64, StoreError> {
        let opts = QueryOptions { count: true, no_limit: filter.limit.unwrap_or(0) == 0 };
        let qb = query::compile(filter, &opts, 0, crate::time::now_secs());
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn insert(&self, event: &Event, _now: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events (id, created_at, pubkey, kind, content, tags, sig, expiration, updated_ip, updated_at, deleted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&event.id)
        .bind(event.created_at as i32)
        .bind(&event.pubkey)
        .bind(event.kind as i32)
        .bind(&event.content)
        .bind(Json(&event.tags))
        .bind(&event.sig)
        .bind(event.expiration.map(|v| v as i32))
        .bind(&event.updated_ip)
        .bind(event.updated_at.map(|v| v as i32))
        .bind(event.deleted_at.map(|v| v as i32))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete(&self, id: &str, now: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE events SET deleted_at = $1, updated_at = $1 WHERE id = $2")
            .bind(now as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn hard_delete(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_blacklist(&self, pubkey: &str, now: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO blacklists (pubkey, created_at) VALUES ($1, $2)
             ON CONFLICT (pubkey) DO UPDATE SET updated_at = $2, deleted_at = NULL",
        )
        .bind(pubkey)
        .bind(now as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_blacklists(&self, filter: &BlacklistFilter) -> Result<Vec<Blacklist>, StoreError> {
        let rows = if let Some(pubkey) = &filter.pubkey {
            sqlx::query("SELECT pubkey, created_at, updated_at, deleted_at FROM blacklists WHERE pubkey = $1 AND deleted_at IS NULL")
                .bind(pubkey)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query("SELECT pubkey, created_at, updated_at, deleted_at FROM blacklists WHERE deleted_at IS NULL")
                .fetch_all(&self.pool)
                .await?
        };
        rows.iter()
            .map(|row| {
                Ok(Blacklist {
                    pubkey: row.try_get("pubkey")?,
                    created_at: row.try_get::<i32, _>("created_at")? as i64,
                    updated_at: row.try_get::<Option<i32>, _>("updated_at")?.map(|v| v as i64),
                    deleted_at: row.try_get::<Option<i32>, _>("deleted_at")?.map(|v| v as i64),
                })
            })
            .collect()
    }

    async fn find_expired_events(&self, now: i64) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, created_at, pubkey, kind, tags, content, sig, expiration, updated_ip, updated_at, deleted_at
             FROM events WHERE expiration IS NOT NULL AND expiration < $1 AND deleted_at IS NULL",
        )
        .bind(now as i32)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_event).collect()
    }
}
