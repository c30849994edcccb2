//! Background sweep (§4.8): two independent timers purging expired and
//! blacklisted events. Grounded on the Go original's `pgk/cron/service.go`
//! (`robfig/cron` schedules `*/5 * * * *` / `*/30 * * * *`), translated to
//! cooperative `tokio::time::interval` tasks that join on shutdown instead
//! of a third-party cron scheduler — matching §9's "background tasks must
//! have clear cancellation" note.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::model::BlacklistFilter;
use crate::store::Store;

const EXPIRATION_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const BLACKLIST_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

pub struct Janitor {
    store: Arc<dyn Store>,
}

impl Janitor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Janitor { store }
    }

    /// Spawns the two sweep loops; both stop once `shutdown` is signalled.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let expiration_janitor = self.clone();
        let mut expiration_shutdown = shutdown.clone();
        let expiration_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EXPIRATION_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => expiration_janitor.sweep_expired().await,
                    _ = expiration_shutdown.changed() => break,
                }
            }
        });

        let blacklist_janitor = self;
        let blacklist_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(BLACKLIST_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => blacklist_janitor.sweep_blacklisted().await,
                    _ = shutdown.changed() => break,
                }
            }
        });

        tokio::spawn(async move {
            let _ = tokio::join!(expiration_task, blacklist_task);
        })
    }

    async fn sweep_expired(&self) {
        let now = crate::time::now_secs();
        match self.store.find_expired_events(now).await {
            Ok(events) => {
                let count = events.len();
                for event in events {
                    if let Err(err) = self.store.hard_delete(&event.id).await {
                        error!(event_id = %event.id, error = %err, "janitor: hard delete failed");
                    }
                }
                info!(count, "janitor: expiration sweep ran");
            }
            Err(err) => error!(error = %err, "janitor: find expired events failed"),
        }
    }

    async fn sweep_blacklisted(&self) {
        let now = crate::time::now_secs();
        let blacklists = match self.store.find_blacklists(&BlacklistFilter::default()).await {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, "janitor: find blacklists failed");
                return;
            }
        };
        for entry in blacklists {
            let filter = crate::model::Filter { authors: vec![entry.pubkey.clone()], ..Default::default() };
            let opts = crate::query::QueryOptions { count: false, no_limit: true };
            match self.store.find_all(&filter, opts, 0).await {
                Ok(events) => {
                    for event in events {
                        if let Err(err) = self.store.soft_delete(&event.id, now).await {
                            error!(event_id = %event.id, error = %err, "janitor: soft delete failed");
                        }
                    }
                }
                Err(err) => error!(pubkey = %entry.pubkey, error = %err, "janitor: find blacklisted events failed"),
            }
        }
    }
}
