//! Application state: injected storage handle, prompts, and the optional
//! text-generation client.
//!
//! Nothing here is process-global: `main` builds one `AppState` after opening the
//! storage handle and passes it to the router, and tests build their own.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::config::{AppConfig, Prompts};
use crate::openai::{OpenAI, TextGenerator};
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub prompts: Prompts,
    /// Upper bound on any single model call, on top of the HTTP client timeout.
    pub llm_timeout: Duration,
}

impl AppState {
    /// Build state from config around an already-open storage handle.
    #[instrument(level = "info", skip_all)]
    pub fn from_config(cfg: &AppConfig, storage: Storage) -> Self {
        let generator = OpenAI::from_config(&cfg.llm).map(|oa| {
            info!(target: "buddy_backend", base_url = %oa.base_url, model = %oa.model, "Text generation enabled.");
            Arc::new(oa) as Arc<dyn TextGenerator>
        });
        if generator.is_none() {
            info!(target: "buddy_backend", "Text generation disabled (no OPENAI_API_KEY). Using static fallbacks.");
        }

        Self::new(storage, generator, cfg.prompts.clone(), cfg.llm.timeout())
    }

    pub fn new(
        storage: Storage,
        generator: Option<Arc<dyn TextGenerator>>,
        prompts: Prompts,
        llm_timeout: Duration,
    ) -> Self {
        Self { storage, generator, prompts, llm_timeout }
    }
}
