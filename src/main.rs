//! Process entry (§4.13). Wiring order mirrors the Go original's `main.go`:
//! init logger, init config, init DB connection + migrate, init relay
//! (gateway router), start the janitor, serve, then on SIGINT/SIGTERM run
//! the same cleanup sequence the source runs from its `serverShutdown`
//! channel — close the gateway, stop the janitor, close the pool.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use reraw_relay::cli::Cli;
use reraw_relay::config::{self, ConfigHandle};
use reraw_relay::gateway::{self, GatewayState};
use reraw_relay::janitor::Janitor;
use reraw_relay::limiter::IpRateLimiter;
use reraw_relay::store::{PgStore, Store};

const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = Cli::parse();

    let mut cfg = match config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, path = %cli.config.display(), "init configuration error");
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.port {
        cfg.app.port = port;
    }
    let listen_port = cfg.app.port;
    let limiter_cfg = cfg.limiter.clone();

    let config_handle: ConfigHandle = config::new_handle(cfg);
    let _watcher = match config::watch(cli.config.clone(), config_handle.clone()) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            error!(error = %err, "config watcher init failed, continuing without hot reload");
            None
        }
    };

    let store: Arc<dyn Store> = {
        let snapshot = config_handle.load_full();
        let store = match PgStore::connect(&snapshot.database.relay_sql).await {
            Ok(store) => store,
            Err(err) => {
                error!(error = %err, "init connection db error");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = store.migrate().await {
            error!(error = %err, "migration db error");
            return ExitCode::FAILURE;
        }
        Arc::new(store)
    };

    let (broadcast_tx, _rx) = broadcast::channel(1024);
    let limiter = Arc::new(IpRateLimiter::new(limiter_cfg.requests_per_second, limiter_cfg.burst));
    let gateway_state = Arc::new(GatewayState::new(store.clone(), config_handle.clone(), limiter, broadcast_tx));
    let app = gateway::router(gateway_state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let janitor = Arc::new(Janitor::new(store.clone()));
    let janitor_handle = janitor.spawn(shutdown_rx);

    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, %addr, "app start error");
            return ExitCode::FAILURE;
        }
    };
    info!(%addr, "listening");

    let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(wait_for_shutdown_signal());

    if let Err(err) = serve.await {
        error!(error = %err, "server error");
    }

    info!("gracefully shutting down...");
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(SHUTDOWN_GRACE, janitor_handle).await.is_err() {
        error!("janitor did not stop within the shutdown grace period");
    }
    info!("app was successfully shut down");

    ExitCode::SUCCESS
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
