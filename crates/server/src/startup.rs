use std::{net::SocketAddr, time::Duration};

use axum::Router;
use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::errors::StartupError;
use crate::routes::{self, AppState};
use service::runtime;

fn build_cors() -> CorsLayer {
    CorsLayer::permissive()
}

fn bind_addr(cfg: &configs::AppConfig) -> Result<SocketAddr, StartupError> {
    format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .map_err(|e| StartupError::InvalidConfig(format!("server address: {e}")))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(event = "shutdown_signal", "received Ctrl+C, draining in-flight requests");
    }
}

/// Public entry: load config, restore broker state and serve the broker API
pub async fn run(cfg: configs::AppConfig) -> Result<(), StartupError> {
    dotenv().ok();

    // State directory must exist before the broker restores
    common::env::ensure_data_dir(&cfg.broker.data_dir)
        .await
        .map_err(|e| StartupError::Runtime(e.to_string()))?;

    // Provisioner client + state file
    let broker = runtime::build_broker(&cfg).await?;
    info!(
        service_name = %cfg.broker.service_name,
        state_file = %broker.state_file().display(),
        "broker ready"
    );

    let state = AppState {
        broker,
        provisioner_timeout: Some(Duration::from_secs(cfg.provisioner.timeout_secs)),
    };
    let app: Router = routes::build_router(state, build_cors());

    // Bind and serve until Ctrl+C
    let addr = bind_addr(&cfg)?;
    info!(%addr, "starting broker server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError::Runtime(format!("cannot bind {addr}: {e}")))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Runtime(e.to_string()))?;
    Ok(())
}
