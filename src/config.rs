//! Loading service configuration (server, database, model, prompts, clinicians)
//! from TOML, with environment overrides.
//!
//! Every section is optional; see `AppConfig` for the schema. Environment variables
//! win over the file: PORT, DATABASE_URL, OPENAI_API_KEY, OPENAI_BASE_URL,
//! OPENAI_MODEL, LLM_TIMEOUT_SECS.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::Clinician;
use tracing::{error, info, warn};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub database: DatabaseConfig,
  #[serde(default)]
  pub llm: LlmConfig,
  #[serde(default)]
  pub prompts: Prompts,
  /// Clinicians registered at startup (`[[clinicians]]` tables).
  #[serde(default)]
  pub clinicians: Vec<Clinician>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub port: u16,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self { port: 3000 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
  pub url: String,
  pub max_connections: u32,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self { url: "sqlite://buddyai.db".into(), max_connections: 5 }
  }
}

/// Text-generation settings. No API key means the model is disabled and all
/// generated content comes from static fallbacks.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
  pub api_key: Option<String>,
  pub base_url: String,
  pub model: String,
  pub timeout_secs: u64,
}

impl Default for LlmConfig {
  fn default() -> Self {
    Self {
      api_key: None,
      base_url: "https://api.openai.com/v1".into(),
      model: "gpt-4o-mini".into(),
      timeout_secs: 15,
    }
  }
}

impl LlmConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }
}

/// Prompts sent to the text-generation model. `{placeholders}` are filled by
/// `util::fill_template`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub insight_system: String,
  pub insight_user_template: String,
  pub touchpoint_system: String,
  pub touchpoint_user_template: String,
  pub simulate_system_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      insight_system: "You are BuddyAI, a warm social anxiety companion. Return ONLY valid JSON. No markdown. No explanation.".into(),
      insight_user_template: r#"Here are the user's social anxiety wellness scores:

{score_lines}

Return ONLY valid JSON (no markdown, no explanation) with exactly this structure:
{
  "narrative": "2-3 sentence natural language profile that reads like a calm, empathetic friend speaking. Start with what they do well, then acknowledge the challenge area. Make it specific to these scores.",
  "dimension_insights": {
    "emotional": "one specific, actionable micro-insight for Emotional Resilience based on this score",
    "anxiety": "one specific, actionable micro-insight for Anxiety & Mental Clarity based on this score",
    "spiritual": "one specific, actionable micro-insight for Spiritual Connection based on this score",
    "social": "one specific, actionable micro-insight for Relational Wellness based on this score",
    "lifestyle": "one specific, actionable micro-insight for Body & Lifestyle based on this score"
  },
  "growth_focus": "name of the single dimension with the lowest score, the one to focus on this week"
}"#.into(),
      touchpoint_system: "You are BuddyAI. Return ONLY valid JSON. No markdown.".into(),
      touchpoint_user_template: r#"Today is {date}. Generate a daily social anxiety touchpoint for a user.
{score_context}

Return ONLY valid JSON:
{
  "affirmation": "One short, genuine affirmation (1 sentence, warm and human, not cheesy)",
  "challenge": {
    "title": "A specific micro-challenge title (5-8 words)",
    "description": "2 sentences expanding on the challenge, practical and achievable today",
    "difficulty": "easy"
  },
  "comfort_zone": "One sentence describing a comfort zone expansion to notice today (observational, not demanding)"
}

Difficulty must be exactly one of: easy, medium, hard.
Make the challenge specific to their anxiety profile. Keep all text warm, human, and encouraging."#.into(),
      simulate_system_template: r#"You are BuddyAI, a warm, calm social anxiety coach. The user is practicing a social situation they find anxiety-inducing.

Situation they're preparing for: "{situation}"
{score_context}

Your role: Coach them through the anxiety with empathy, practical steps, and gentle encouragement. Be conversational (2-4 sentences). Don't be clinical. Speak like a trusted friend who also happens to know evidence-based CBT and acceptance techniques."#.into(),
    }
  }
}

impl AppConfig {
  /// Load from BUDDY_CONFIG_PATH (if set and readable), then apply env overrides.
  pub fn load() -> Self {
    let mut cfg = load_config_file_from_env().unwrap_or_default();
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg
  }

  /// Apply overrides from a key lookup (the process environment in production).
  pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
    if let Some(port) = get("PORT") {
      match port.parse::<u16>() {
        Ok(p) => self.server.port = p,
        Err(e) => warn!(target: "buddy_backend", %port, error = %e, "Ignoring invalid PORT"),
      }
    }
    if let Some(url) = get("DATABASE_URL") {
      self.database.url = url;
    }
    if let Some(key) = get("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
      self.llm.api_key = Some(key);
    }
    if let Some(base) = get("OPENAI_BASE_URL") {
      self.llm.base_url = base;
    }
    if let Some(model) = get("OPENAI_MODEL") {
      self.llm.model = model;
    }
    if let Some(secs) = get("LLM_TIMEOUT_SECS") {
      match secs.parse::<u64>() {
        Ok(s) => self.llm.timeout_secs = s,
        Err(e) => warn!(target: "buddy_backend", %secs, error = %e, "Ignoring invalid LLM_TIMEOUT_SECS"),
      }
    }
  }
}

/// Attempt to load `AppConfig` from BUDDY_CONFIG_PATH. On any parsing/IO error, returns None.
fn load_config_file_from_env() -> Option<AppConfig> {
  let path = std::env::var("BUDDY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "buddy_backend", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "buddy_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "buddy_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
