//! An author-level ban list the janitor and ingest engine both consult.

#[derive(Debug, Clone)]
pub struct Blacklist {
    pub pubkey: String,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

impl Blacklist {
    pub fn new(pubkey: impl Into<String>, now: i64) -> Self {
        Blacklist {
            pubkey: pubkey.into(),
            created_at: now,
            updated_at: None,
            deleted_at: None,
        }
    }
}

/// Narrow filter used to look blacklist rows up; an empty pubkey means "all".
#[derive(Debug, Clone, Default)]
pub struct BlacklistFilter {
    pub pubkey: Option<String>,
}
