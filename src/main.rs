//! CodeQuest · learning engine backend
//!
//! - Axum HTTP + WebSocket API
//! - Optional external code runner (via environment variables)
//! - Static frontend fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   ENGINE_CONFIG_PATH     : path to TOML config (runner, awards, content bank)
//!   CODE_RUNNER_URL        : enables submission checking if present
//!   CODE_RUNNER_TIMEOUT_MS : per-run timeout (default 5000)
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use codequest::routes::build_router;
use codequest::state::AppState;
use codequest::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Content bank, progress stores, persistence gateway, code runner.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "codequest", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "codequest", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
