//! BuddyAI · Wellness Backend
//!
//! - Axum HTTP API: daily challenge, streaks, assessments, simulator, share card,
//!   clinician dashboard, ops report
//! - SQLite persistence via sqlx (migrations run on startup)
//! - Optional OpenAI-compatible text generation with static fallbacks
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   DATABASE_URL      : default "sqlite://buddyai.db"
//!   OPENAI_API_KEY    : enables text generation if present
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_MODEL      : default "gpt-4o-mini"
//!   LLM_TIMEOUT_SECS  : per-call deadline for the model (default 15)
//!   BUDDY_CONFIG_PATH : path to TOML config (server, database, llm, prompts, clinicians)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod seeds;
mod streak;
mod rotation;
mod storage;
mod clinician;
mod state;
mod protocol;
mod logic;
mod openai;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::domain::{normalize_code, Clinician};
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::Storage;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = AppConfig::load();

  // Open the database and bring the schema up to date before serving anything.
  let storage = Storage::connect(&cfg.database.url, cfg.database.max_connections).await?;
  for clinician in &cfg.clinicians {
    let clinician = Clinician { code: normalize_code(&clinician.code), ..clinician.clone() };
    storage.register_clinician(&clinician).await?;
    info!(target: "buddy_backend", code = %clinician.code, provider = clinician.provider_type.as_str(), "Clinician registered");
  }
  let state = Arc::new(AppState::from_config(&cfg, storage.clone()));

  let app = build_router(state);

  let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "buddy_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  storage.close().await;
  info!(target: "buddy_backend", "Shut down cleanly");
  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!(target: "buddy_backend", error = %e, "Failed to listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::error!(target: "buddy_backend", error = %e, "Failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  info!(target: "buddy_backend", "Shutdown signal received");
}
