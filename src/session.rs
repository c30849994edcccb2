//! Per-connection state machine (§4.2). Grounded on the teacher's
//! `handle_socket`: split the socket, fan writes through a single mpsc
//! queue drained by one task so outbound frames are never interleaved, and
//! `tokio::select!` between the read half and a broadcast receiver for live
//! fan-out. Command dispatch itself follows the Go original's
//! `relay/handlers.go` `onEvent`/`onReq`/`onClose`/`onCount`.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::codec::{self, ClientMessage, RelayMessage};
use crate::config::{Config, ConfigHandle};
use crate::error::{ingest_reason, outbound_reason, query_reason, QueryError, ReasonKind};
use crate::ingest::{self, IngestOutcome};
use crate::limiter::IpRateLimiter;
use crate::model::{Event, Filter};
use crate::policy::Policy;
use crate::query::QueryOptions;
use crate::store::Store;

const PONG_WAIT: Duration = Duration::from_secs(120);
const PING_INTERVAL: Duration = Duration::from_secs(30);
/// Hard upper bound on subscription id length (§3 Subscription invariant),
/// independent of the optional `max_subid_length` config knob which may
/// only narrow it further.
const MAX_SUBID_LEN: usize = 64;

pub struct SessionState {
    pub store: Arc<dyn Store>,
    pub config: ConfigHandle,
    pub policy: Arc<Policy>,
    pub broadcast: broadcast::Sender<Event>,
    pub limiter: Arc<IpRateLimiter>,
}

struct SubscriptionSlot {
    id: String,
    filters: Vec<Filter>,
}

pub async fn handle_socket(socket: WebSocket, state: Arc<SessionState>, client_ip: IpAddr) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.broadcast.subscribe();

    let (tx, mut rx) = mpsc::channel::<Message>(128);
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let ping_tx = tx.clone();
    let mut ping_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        loop {
            ticker.tick().await;
            if ping_tx.send(Message::Ping(Vec::new())).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions: VecDeque<SubscriptionSlot> = VecDeque::new();

    loop {
        tokio::select! {
            frame = timeout(PONG_WAIT, receiver.next()) => {
                match frame {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let config = state.config.load_full();
                        dispatch(&text, &state, &config, &tx, &mut subscriptions, client_ip).await;
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => {}
                    Ok(Some(Ok(_))) => {
                        let _ = tx.send(Message::Text(RelayMessage::Notice { text: "only text frames are accepted".to_string() }.to_text())).await;
                    }
                    Ok(Some(Err(err))) => {
                        warn!(%client_ip, error = %err, "websocket read error");
                        break;
                    }
                    Err(_) => {
                        debug!(%client_ip, "read deadline exceeded, closing");
                        break;
                    }
                }
            }
            Ok(event) = broadcast_rx.recv() => {
                fan_out(&event, &subscriptions, &tx).await;
            }
        }
    }

    send_task.abort();
    ping_task.abort();
    info!(%client_ip, "session closed");
}

async fn dispatch(
    text: &str,
    state: &Arc<SessionState>,
    config: &Config,
    tx: &mpsc::Sender<Message>,
    subscriptions: &mut VecDeque<SubscriptionSlot>,
    client_ip: IpAddr,
) {
    let limits = &config.info.limitation;
    if limits.max_message_length > 0 && text.len() as i64 > limits.max_message_length {
        let _ = tx.send(Message::Text(RelayMessage::Notice { text: "message too large".to_string() }.to_text())).await;
        return;
    }

    let message = match codec::decode(text) {
        Ok(message) => message,
        Err(err) => {
            let _ = tx.send(Message::Text(RelayMessage::Notice { text: err.to_string() }.to_text())).await;
            return;
        }
    };

    match message {
        ClientMessage::Event(event) => {
            handle_event(*event, state, config, tx, client_ip).await;
        }
        ClientMessage::Req { sub_id, filters } => {
            handle_req(sub_id, filters, state, config, tx, subscriptions).await;
        }
        ClientMessage::Close { sub_id } => {
            subscriptions.retain(|s| s.id != sub_id);
        }
        ClientMessage::Count { sub_id, filters } => {
            handle_count(sub_id, filters, state, config, tx).await;
        }
    }
}

async fn handle_event(event: Event, state: &Arc<SessionState>, config: &Config, tx: &mpsc::Sender<Message>, client_ip: IpAddr) {
    let event_id = event.id.clone();
    if !state.limiter.check(client_ip) {
        let reason = outbound_reason(ReasonKind::RateLimited, "slow down");
        let _ = tx.send(Message::Text(RelayMessage::Ok { event_id: &event_id, accepted: false, reason }.to_text())).await;
        return;
    }
    let now = crate::time::now_secs();
    match ingest::ingest(event.clone(), &state.policy, &state.store, config, Some(client_ip.to_string()), now).await {
        Ok((IngestOutcome::Duplicate, _)) => {
            let _ = tx
                .send(Message::Text(RelayMessage::Ok { event_id: &event_id, accepted: true, reason: "duplicate: already have this event".to_string() }.to_text()))
                .await;
        }
        Ok((outcome, deletes)) => {
            let _ = tx.send(Message::Text(RelayMessage::Ok { event_id: &event_id, accepted: true, reason: String::new() }.to_text())).await;
            for delete in deletes.iter().filter(|d| d.forbidden) {
                warn!(target = %delete.target_id, author = %event.pubkey, "refused foreign delete");
                let reason = crate::error::outbound_reason(crate::error::ReasonKind::Blocked, "you are not the author of this event");
                let _ = tx.send(Message::Text(RelayMessage::Ok { event_id: &delete.target_id, accepted: false, reason }.to_text())).await;
            }
            if !matches!(outcome, IngestOutcome::Duplicate) {
                let _ = state.broadcast.send(event);
            }
        }
        Err(err) => {
            let _ = tx.send(Message::Text(RelayMessage::Ok { event_id: &event_id, accepted: false, reason: ingest_reason(&err) }.to_text())).await;
        }
    }
}

/// 1..=64 is a protocol-level invariant (§3 Subscription), independent of
/// whether the config narrows it further via `max_subid_length`; `0` there
/// means "no additional cap", not "no cap at all".
fn subid_length_ok(len: usize, max_subid_length: i64) -> bool {
    let cap = if max_subid_length > 0 {
        (max_subid_length as usize).min(MAX_SUBID_LEN)
    } else {
        MAX_SUBID_LEN
    };
    (1..=cap).contains(&len)
}

async fn handle_req(
    sub_id: String,
    filters: Vec<Filter>,
    state: &Arc<SessionState>,
    config: &Config,
    tx: &mpsc::Sender<Message>,
    subscriptions: &mut VecDeque<SubscriptionSlot>,
) {
    let limits = &config.info.limitation;
    if !subid_length_ok(sub_id.len(), limits.max_subid_length) {
        let _ = tx.send(Message::Text(RelayMessage::Closed { sub_id: &sub_id, reason: "invalid: subscription id length out of range".to_string() }.to_text())).await;
        return;
    }
    if limits.max_filters > 0 && filters.len() as i64 > limits.max_filters {
        let _ = tx.send(Message::Text(RelayMessage::Closed { sub_id: &sub_id, reason: "invalid: too many filters".to_string() }.to_text())).await;
        return;
    }
    for filter in &filters {
        if let Some(reason) = state.policy.reject_filter(filter) {
            let _ = tx.send(Message::Text(RelayMessage::Closed { sub_id: &sub_id, reason: reason.to_string() }.to_text())).await;
            return;
        }
    }

    subscriptions.retain(|s| s.id != sub_id);
    if limits.max_subscriptions > 0 && subscriptions.len() as i64 >= limits.max_subscriptions {
        subscriptions.pop_front();
    }
    subscriptions.push_back(SubscriptionSlot { id: sub_id.clone(), filters: filters.clone() });

    let max_limit = limits.max_limit;
    for filter in &filters {
        match state.store.find_all(filter, QueryOptions { count: false, no_limit: false }, max_limit).await {
            Ok(events) => {
                for event in &events {
                    let _ = tx.send(Message::Text(RelayMessage::Event { sub_id: &sub_id, event }.to_text())).await;
                }
            }
            Err(err) => {
                let reason = query_reason(&QueryError::Store(err));
                let _ = tx.send(Message::Text(RelayMessage::Closed { sub_id: &sub_id, reason }.to_text())).await;
                return;
            }
        }
    }
    let _ = tx.send(Message::Text(RelayMessage::Eose { sub_id: &sub_id }.to_text())).await;
}

async fn handle_count(sub_id: String, filters: Vec<Filter>, state: &Arc<SessionState>, _config: &Config, tx: &mpsc::Sender<Message>) {
    for filter in &filters {
        if let Some(reason) = state.policy.reject_filter(filter) {
            let _ = tx.send(Message::Text(RelayMessage::Closed { sub_id: &sub_id, reason: reason.to_string() }.to_text())).await;
            return;
        }
    }
    let mut total = 0i64;
    for filter in &filters {
        match state.store.count(filter).await {
            Ok(count) => total += count,
            Err(err) => {
                let reason = query_reason(&QueryError::Store(err));
                let _ = tx.send(Message::Text(RelayMessage::Closed { sub_id: &sub_id, reason }.to_text())).await;
                return;
            }
        }
    }
    let _ = tx.send(Message::Text(RelayMessage::Count { sub_id: &sub_id, count: total }.to_text())).await;
}

async fn fan_out(event: &Event, subscriptions: &VecDeque<SubscriptionSlot>, tx: &mpsc::Sender<Message>) {
    for sub in subscriptions {
        if sub.filters.iter().any(|f| f.matches(event)) {
            let _ = tx.send(Message::Text(RelayMessage::Event { sub_id: &sub.id, event }.to_text())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subid_length_enforces_protocol_bounds_regardless_of_config() {
        // §8 boundary property: 1 and 64 accepted, 0 and 65 rejected, even
        // when the config never set an explicit `max_subid_length`.
        assert!(!subid_length_ok(0, 0));
        assert!(subid_length_ok(1, 0));
        assert!(subid_length_ok(64, 0));
        assert!(!subid_length_ok(65, 0));
    }

    #[test]
    fn subid_length_respects_tighter_config_cap() {
        assert!(subid_length_ok(16, 16));
        assert!(!subid_length_ok(17, 16));
    }

    #[test]
    fn subid_length_config_cap_cannot_loosen_protocol_max() {
        assert!(!subid_length_ok(65, 100));
    }
}
