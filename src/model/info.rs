//! NIP-11 relay information document.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RelayInformationDocument {
    pub name: String,
    pub description: String,
    pub pubkey: String,
    pub contact: String,
    pub supported_nips: Vec<i32>,
    pub software: String,
    pub version: String,
    pub icon: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limitation: Option<RelayLimitationDocument>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayLimitationDocument {
    #[serde(skip_serializing_if = "is_zero")]
    pub max_message_length: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_subscriptions: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_filters: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_limit: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_subid_length: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_event_tags: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_content_length: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub min_pow_difficulty: i64,
    pub auth_required: bool,
    pub payment_required: bool,
    pub restricted_writes: bool,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}
