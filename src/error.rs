//! Error taxonomy. Each layer returns its own `thiserror`-derived enum;
//! [`OutboundReason`] is the single place that maps any of them onto the
//! seven outbound reason kinds the wire protocol recognizes (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("event id is computed incorrectly")]
    IdMismatch,
    #[error("could not parse pubkey or signature: {0}")]
    MalformedKeyMaterial(String),
    #[error("signature is invalid")]
    BadSignature,
    #[error("created_at out of range")]
    CreatedAtOutOfRange,
    #[error("kind out of range")]
    KindOutOfRange,
    #[error("content too long")]
    ContentTooLong,
    #[error("too many tags")]
    TooManyTags,
    #[error("insufficient difficulty")]
    InsufficientPow,
    #[error("created_at outside allowed drift")]
    TimestampOutOfDrift,
    #[error("content contains a blocked substring")]
    BlockedContent,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error("author is blacklisted")]
    Blacklisted,
    #[error("this relay does not accept event publication")]
    RestrictedWrites,
    #[error("missing 'd' tag")]
    MissingDTag,
    #[error("expiration")]
    InvalidExpiration,
    #[error("already have this event")]
    Duplicate,
    #[error("you are not the author of this event")]
    ForeignDelete,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("filter rejected: {0}")]
    FilterRejected(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid message: {0}")]
    Malformed(String),
}

/// The seven kinds a client-visible `OK`/`CLOSED` reason string may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonKind {
    Invalid,
    Pow,
    Duplicate,
    Blocked,
    RateLimited,
    Error,
    Restricted,
}

impl ReasonKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonKind::Invalid => "invalid",
            ReasonKind::Pow => "pow",
            ReasonKind::Duplicate => "duplicate",
            ReasonKind::Blocked => "blocked",
            ReasonKind::RateLimited => "rate-limited",
            ReasonKind::Error => "error",
            ReasonKind::Restricted => "restricted",
        }
    }
}

/// Formats a `"<kind>: <text>"` outbound reason string, per §4.3.
pub fn outbound_reason(kind: ReasonKind, text: impl AsRef<str>) -> String {
    format!("{}: {}", kind.as_str(), text.as_ref())
}

impl From<&ValidatorError> for ReasonKind {
    fn from(e: &ValidatorError) -> Self {
        match e {
            ValidatorError::InsufficientPow => ReasonKind::Pow,
            ValidatorError::BlockedContent => ReasonKind::Blocked,
            ValidatorError::MalformedKeyMaterial(_) => ReasonKind::Error,
            _ => ReasonKind::Invalid,
        }
    }
}

impl From<&IngestError> for ReasonKind {
    fn from(e: &IngestError) -> Self {
        match e {
            IngestError::Validator(v) => v.into(),
            IngestError::Blacklisted | IngestError::ForeignDelete => ReasonKind::Blocked,
            IngestError::RestrictedWrites => ReasonKind::Restricted,
            IngestError::MissingDTag | IngestError::InvalidExpiration => ReasonKind::Invalid,
            IngestError::Duplicate => ReasonKind::Duplicate,
            IngestError::Store(_) => ReasonKind::Error,
        }
    }
}

impl From<&QueryError> for ReasonKind {
    fn from(e: &QueryError) -> Self {
        match e {
            QueryError::FilterRejected(_) => ReasonKind::Blocked,
            QueryError::Store(_) => ReasonKind::Error,
        }
    }
}

/// Converts any ingest outcome into the wire-visible `"<kind>: <text>"` reason.
pub fn ingest_reason(err: &IngestError) -> String {
    outbound_reason(ReasonKind::from(err), err.to_string())
}

pub fn query_reason(err: &QueryError) -> String {
    outbound_reason(ReasonKind::from(err), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_reason_formats_kind_prefix() {
        let err = IngestError::Duplicate;
        assert_eq!(ingest_reason(&err), "duplicate: already have this event");

        let err = IngestError::Validator(ValidatorError::InsufficientPow);
        assert_eq!(ingest_reason(&err), "pow: insufficient difficulty");

        let err = IngestError::ForeignDelete;
        assert_eq!(ingest_reason(&err), "blocked: you are not the author of this event");
    }

    #[test]
    fn malformed_key_material_is_an_error_not_invalid() {
        // §4.4 step 2: a hex parse failure is `error:`, distinct from a
        // verification failure (`BadSignature`), which is `invalid:`.
        let err = IngestError::Validator(ValidatorError::MalformedKeyMaterial("pubkey: odd length".to_string()));
        assert_eq!(ingest_reason(&err), "error: could not parse pubkey or signature: pubkey: odd length");

        let err = IngestError::Validator(ValidatorError::BadSignature);
        assert_eq!(ingest_reason(&err), "invalid: signature is invalid");
    }
}
