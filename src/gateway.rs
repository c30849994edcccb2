//! HTTP entry point (§4.1): WebSocket upgrade, NIP-11 info document, plain
//! text fallback, cached favicon. Grounded on the teacher's `handler()` /
//! `handle_socket()` split in `main.rs`, generalized with the pre-upgrade
//! policy (`core/utils/utils.go`'s `GetIP`, the empty-`User-Agent` and
//! per-IP-limiter rejections the Go original runs in `relay/relay.go`
//! before accepting the socket).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::config::{Config, ConfigHandle, Info};
use crate::limiter::{client_ip, IpRateLimiter};
use crate::model::{Event, RelayInformationDocument, RelayLimitationDocument};
use crate::policy::Policy;
use crate::session::{self, SessionState};
use crate::store::Store;

pub struct GatewayState {
    pub session: Arc<SessionState>,
    pub limiter: Arc<IpRateLimiter>,
    pub favicon: RwLock<Option<Arc<[u8]>>>,
}

impl GatewayState {
    pub fn new(store: Arc<dyn Store>, config: ConfigHandle, limiter: Arc<IpRateLimiter>, broadcast: broadcast::Sender<Event>) -> Self {
        let policy = Arc::new(Policy::new(store.clone()));
        GatewayState {
            session: Arc::new(SessionState { store, config, policy, broadcast, limiter: limiter.clone() }),
            limiter,
            favicon: RwLock::new(None),
        }
    }
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", get(handler))
        .route("/favicon.ico", get(favicon))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
}

async fn handler(
    ws: Option<WebSocketUpgrade>,
    headers: HeaderMap,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let forwarded = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let ip = client_ip(forwarded, remote.ip());

    if let Some(ws) = ws {
        if reject_connection(&headers, ip, &state) {
            return StatusCode::BAD_REQUEST.into_response();
        }
        let session_state = state.session.clone();
        return ws.on_upgrade(move |socket| async move {
            info!(%ip, "session opened");
            session::handle_socket(socket, session_state, ip).await;
        })
        .into_response();
    }

    let config = state.session.config.load_full();
    if wants_nip11(&headers) {
        return Json(relay_information(&config)).into_response();
    }

    plain_text_info(&config.info).into_response()
}

fn wants_nip11(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/nostr+json"))
        .unwrap_or(false)
}

fn relay_information(config: &Config) -> RelayInformationDocument {
    let limits = &config.info.limitation;
    RelayInformationDocument {
        name: config.info.name.clone(),
        description: config.info.description.clone(),
        pubkey: config.info.pubkey.clone(),
        contact: config.info.contact.clone(),
        supported_nips: config.info.supported_nips.clone(),
        software: config.info.software.clone(),
        version: config.info.version.clone(),
        icon: config.info.icon.clone(),
        limitation: Some(RelayLimitationDocument {
            max_message_length: limits.max_message_length,
            max_subscriptions: limits.max_subscriptions,
            max_filters: limits.max_filters,
            max_limit: limits.max_limit,
            max_subid_length: limits.max_subid_length,
            max_event_tags: limits.max_event_tags,
            max_content_length: limits.max_content_length,
            min_pow_difficulty: limits.min_pow_difficulty,
            auth_required: limits.auth_required,
            payment_required: limits.payment_required,
            restricted_writes: limits.restricted_writes,
        }),
    }
}

fn plain_text_info(info: &Info) -> String {
    format!(
        "{}\n{}\npubkey: {}\ncontact: {}\nsupported_nips: {:?}\nsoftware: {}\nversion: {}\n",
        info.name, info.description, info.pubkey, info.contact, info.supported_nips, info.software, info.version,
    )
}

/// Pre-upgrade hook (§4.5 `rejectConnection`): empty `User-Agent` or an
/// already-exhausted per-IP bucket refuses the handshake outright.
fn reject_connection(headers: &HeaderMap, ip: IpAddr, state: &GatewayState) -> bool {
    let user_agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok());
    if state.session.policy.reject_connection(user_agent) {
        warn!(%ip, "rejected connection: missing user-agent");
        return true;
    }
    if !state.limiter.check(ip) {
        warn!(%ip, "rejected connection: rate limited");
        return true;
    }
    false
}

/// Fetches `info.icon` once and serves the cached bytes thereafter;
/// failures are swallowed and produce an empty body, matching §4.1's
/// "best-effort" favicon contract.
async fn favicon(State(state): State<Arc<GatewayState>>) -> Response {
    {
        let cached = state.favicon.read().await;
        if let Some(bytes) = cached.as_ref() {
            return favicon_response(bytes.clone());
        }
    }

    let icon_url = state.session.config.load_full().info.icon.clone();
    if icon_url.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let bytes: Arc<[u8]> = match reqwest::get(&icon_url).await.and_then(|r| r.error_for_status()) {
        Ok(resp) => match resp.bytes().await {
            Ok(body) => Arc::from(body.as_ref()),
            Err(err) => {
                warn!(error = %err, "favicon fetch: reading body failed");
                return StatusCode::NOT_FOUND.into_response();
            }
        },
        Err(err) => {
            warn!(error = %err, url = %icon_url, "favicon fetch failed");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    *state.favicon.write().await = Some(bytes.clone());
    favicon_response(bytes)
}

fn favicon_response(bytes: Arc<[u8]>) -> Response {
    Response::builder()
        .header(header::CACHE_CONTROL, "public, max-age=7776000")
        .body(axum::body::Body::from(bytes.to_vec()))
        .unwrap()
        .into_response()
}
