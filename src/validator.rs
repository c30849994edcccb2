//! Event validator (§4.4): id recomputation, Schnorr verification, bounds,
//! NIP-13 proof-of-work, timestamp drift, content blocklist. Ordered checks,
//! first failure short-circuits — mirrors the Go original's
//! `pgk/nips/nip13/service.go` (`VerifyPow`) and `pgk/policies/service.go`
//! predicates, folded into one pipeline per §4.4/§4.5.

use k256::schnorr::signature::Verifier;
use k256::schnorr::{Signature, VerifyingKey};

use crate::config::InfoLimitation;
use crate::error::ValidatorError;
use crate::model::{Event, MAX_U16, MAX_U32};

/// Runs every bounds/crypto/policy check in §4.4 order. `now` and `limits`
/// come from the caller's config snapshot.
pub fn validate(event: &Event, limits: &InfoLimitation, now: i64) -> Result<(), ValidatorError> {
    if !event.id_matches() {
        return Err(ValidatorError::IdMismatch);
    }
    verify_signature(event)?;
    check_bounds(event, limits)?;
    check_pow(event, limits)?;
    check_timestamp_drift(event, limits, now)?;
    check_content_blocklist(event, limits)?;
    Ok(())
}

fn verify_signature(event: &Event) -> Result<(), ValidatorError> {
    let pubkey_bytes = hex::decode(&event.pubkey)
        .map_err(|e| ValidatorError::MalformedKeyMaterial(format!("pubkey: {e}")))?;
    let pubkey_bytes: [u8; 32] = pubkey_bytes
        .try_into()
        .map_err(|_| ValidatorError::MalformedKeyMaterial("pubkey must be 32 bytes".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&pubkey_bytes)
        .map_err(|e| ValidatorError::MalformedKeyMaterial(format!("pubkey: {e}")))?;

    let sig_bytes = hex::decode(&event.sig)
        .map_err(|e| ValidatorError::MalformedKeyMaterial(format!("sig: {e}")))?;
    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| ValidatorError::MalformedKeyMaterial(format!("sig: {e}")))?;

    let id_bytes = hex::decode(&event.id)
        .map_err(|e| ValidatorError::MalformedKeyMaterial(format!("id: {e}")))?;

    verifying_key
        .verify(&id_bytes, &signature)
        .map_err(|_| ValidatorError::BadSignature)
}

fn check_bounds(event: &Event, limits: &InfoLimitation) -> Result<(), ValidatorError> {
    if event.created_at < 0 || event.created_at > MAX_U32 {
        return Err(ValidatorError::CreatedAtOutOfRange);
    }
    if event.kind < 0 || event.kind > MAX_U16 {
        return Err(ValidatorError::KindOutOfRange);
    }
    if limits.max_content_length > 0 && event.content.chars().count() as i64 > limits.max_content_length {
        return Err(ValidatorError::ContentTooLong);
    }
    if limits.max_event_tags > 0 && event.tags.len() as i64 > limits.max_event_tags {
        return Err(ValidatorError::TooManyTags);
    }
    Ok(())
}

/// NIP-13: work is the leading-zero-bit count of `id`; a `nonce` tag may
/// carry its own target at index 2, which must also be satisfied.
fn check_pow(event: &Event, limits: &InfoLimitation) -> Result<(), ValidatorError> {
    let work = event.pow_difficulty() as i64;

    if let Some(nonce_tag) = event.tags.find_first("nonce") {
        if nonce_tag.0.len() >= 3 {
            if let Ok(target) = nonce_tag.0[2].parse::<i64>() {
                if work < target {
                    return Err(ValidatorError::InsufficientPow);
                }
            }
        }
    }

    if work < limits.min_pow_difficulty {
        return Err(ValidatorError::InsufficientPow);
    }
    Ok(())
}

fn check_timestamp_drift(event: &Event, limits: &InfoLimitation, now: i64) -> Result<(), ValidatorError> {
    if limits.timestamp_drift_secs <= 0 {
        return Ok(());
    }
    let drift = (event.created_at - now).abs();
    if drift > limits.timestamp_drift_secs {
        return Err(ValidatorError::TimestampOutOfDrift);
    }
    Ok(())
}

fn check_content_blocklist(event: &Event, limits: &InfoLimitation) -> Result<(), ValidatorError> {
    if limits.content_blocklist.iter().any(|needle| event.content.contains(needle.as_str())) {
        return Err(ValidatorError::BlockedContent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Tag, Tags};
    use k256::schnorr::signature::Signer;
    use k256::schnorr::SigningKey;
    use rand_core::OsRng;

    fn signed_event(content: &str, created_at: i64) -> Event {
        let signing_key = SigningKey::random(&mut OsRng);
        let pubkey = hex::encode(signing_key.verifying_key().to_bytes());
        let mut evt = Event {
            id: String::new(),
            pubkey,
            created_at,
            kind: 1,
            tags: Tags::default(),
            content: content.to_string(),
            sig: String::new(),
            expiration: None,
            deleted_at: None,
            updated_at: None,
            updated_ip: None,
        };
        evt.id = evt.compute_id().unwrap();
        let id_bytes = hex::decode(&evt.id).unwrap();
        let signature: Signature = signing_key.sign(&id_bytes);
        evt.sig = hex::encode(signature.to_bytes());
        evt
    }

    #[test]
    fn accepts_well_formed_event() {
        let evt = signed_event("hello", 1_700_000_000);
        let limits = InfoLimitation::default();
        assert!(validate(&evt, &limits, 1_700_000_000).is_ok());
    }

    #[test]
    fn rejects_tampered_content() {
        let mut evt = signed_event("hello", 1_700_000_000);
        evt.content.push('!');
        let limits = InfoLimitation::default();
        assert!(matches!(validate(&evt, &limits, 1_700_000_000), Err(ValidatorError::IdMismatch)));
    }

    #[test]
    fn rejects_content_over_limit() {
        let evt = signed_event("hello world", 1_700_000_000);
        let limits = InfoLimitation { max_content_length: 3, ..InfoLimitation::default() };
        assert!(matches!(validate(&evt, &limits, 1_700_000_000), Err(ValidatorError::ContentTooLong)));
    }

    #[test]
    fn rejects_drift_outside_window() {
        let evt = signed_event("hello", 1_700_000_000);
        let limits = InfoLimitation { timestamp_drift_secs: 60, ..InfoLimitation::default() };
        assert!(matches!(
            validate(&evt, &limits, 1_700_010_000),
            Err(ValidatorError::TimestampOutOfDrift)
        ));
    }

    #[test]
    fn rejects_blocked_content_substring() {
        let evt = signed_event("this is spam content", 1_700_000_000);
        let limits = InfoLimitation { content_blocklist: vec!["spam".to_string()], ..InfoLimitation::default() };
        assert!(matches!(validate(&evt, &limits, 1_700_000_000), Err(ValidatorError::BlockedContent)));
    }

    #[test]
    fn nonce_target_enforced_independently_of_min_difficulty() {
        let mut evt = signed_event("hello", 1_700_000_000);
        evt.tags = Tags(vec![Tag(vec!["nonce".into(), "1".into(), "40".into()])]);
        let limits = InfoLimitation::default();
        // id recomputation would now fail since tags changed post-signing,
        // so this only exercises check_pow directly.
        assert!(matches!(check_pow(&evt, &limits), Err(ValidatorError::InsufficientPow)));
    }
}
