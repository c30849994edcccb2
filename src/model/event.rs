//! The signed, content-addressed event: the unit of publication.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::tag::Tags;

pub const MAX_U16: i64 = 65_535;
pub const MAX_U32: i64 = 4_294_967_295;

/// Replaceable kinds: newest `(pubkey, kind)` wins. Kind 41 (channel
/// metadata) is included per this design's resolution of an ambiguity in
/// the source (see SPEC_FULL §9).
pub fn is_replaceable_kind(kind: i64) -> bool {
    kind == 0 || kind == 3 || kind == 41 || (10_000..20_000).contains(&kind)
}

/// Parameterized-replaceable kinds (NIP-33): scoped additionally by `d` tag.
pub fn is_param_replaceable_kind(kind: i64) -> bool {
    (30_000..40_000).contains(&kind)
}

/// Ephemeral kinds: broadcast live, never persisted.
pub fn is_ephemeral_kind(kind: i64) -> bool {
    (20_000..30_000).contains(&kind)
}

/// A signed Nostr event as carried on the wire. The four trailing fields
/// are persisted-only state the store attaches; they are never present in
/// a client-submitted envelope and are skipped on the outbound wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: i64,
    pub tags: Tags,
    pub content: String,
    pub sig: String,

    #[serde(skip_serializing, default)]
    pub expiration: Option<i64>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<i64>,
    #[serde(skip_serializing, default)]
    pub updated_at: Option<i64>,
    #[serde(skip_serializing, default)]
    pub updated_ip: Option<String>,
}

impl Event {
    /// Recomputes the canonical id: `sha256([0, pubkey, created_at, kind, tags, content])`.
    /// serde_json's compact encoder already escapes exactly `"`, `\`, and the
    /// control characters `\n \r \t \x08 \x0c`, matching the wire format this
    /// hash is defined over.
    pub fn compute_id(&self) -> Result<String, serde_json::Error> {
        let payload = (
            0,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        );
        let bytes = serde_json::to_vec(&payload)?;
        let digest = Sha256::digest(&bytes);
        Ok(hex::encode(digest))
    }

    pub fn id_matches(&self) -> bool {
        matches!(self.compute_id(), Ok(id) if id == self.id)
    }

    /// Counts leading zero bits of the hex id, nibble by nibble (NIP-13).
    pub fn pow_difficulty(&self) -> u32 {
        let mut bits = 0u32;
        for c in self.id.chars() {
            let nibble = match c.to_digit(16) {
                Some(n) => n,
                None => break,
            };
            if nibble == 0 {
                bits += 4;
                continue;
            }
            bits += nibble.leading_zeros() - 28;
            break;
        }
        bits
    }

    /// `self < other` iff older by timestamp, or tied and lexicographically
    /// larger id (deterministic tie-break for the replaceable-kind sweep).
    pub fn is_older_than(&self, other: &Event) -> bool {
        self.created_at < other.created_at
            || (self.created_at == other.created_at && self.id > other.id)
    }
}
