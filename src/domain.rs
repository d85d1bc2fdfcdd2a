//! Domain models used by the backend: streak state, completions, dimensions,
//! daily questions, assessment scores and model-generated content.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-user streak row. Created on the first completion, mutated at most once per day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
  pub current_streak: u32,
  pub longest_streak: u32,
  pub last_completed_date: Option<NaiveDate>,
  pub total_completions: u32,
}

impl StreakState {
  /// View used for a user who has never completed anything.
  pub const EMPTY: StreakState = StreakState {
    current_streak: 0,
    longest_streak: 0,
    last_completed_date: None,
    total_completions: 0,
  };
}

/// One completion, unique per (user, date).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRecord {
  pub user_id: String,
  pub completion_date: NaiveDate,
  pub challenge_text: String,
  pub challenge_type: String,
}

/// The five fixed wellness categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
  Emotional,
  Anxiety,
  Spiritual,
  Social,
  Lifestyle,
}

impl Dimension {
  pub const ALL: [Dimension; 5] = [
    Dimension::Emotional,
    Dimension::Anxiety,
    Dimension::Spiritual,
    Dimension::Social,
    Dimension::Lifestyle,
  ];

  pub fn id(self) -> &'static str {
    match self {
      Dimension::Emotional => "emotional",
      Dimension::Anxiety => "anxiety",
      Dimension::Spiritual => "spiritual",
      Dimension::Social => "social",
      Dimension::Lifestyle => "lifestyle",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Dimension::Emotional => "Emotional Resilience",
      Dimension::Anxiety => "Anxiety & Mental Clarity",
      Dimension::Spiritual => "Spiritual Connection",
      Dimension::Social => "Relational Wellness",
      Dimension::Lifestyle => "Body & Lifestyle Balance",
    }
  }

  pub fn icon(self) -> &'static str {
    match self {
      Dimension::Emotional => "💜",
      Dimension::Anxiety => "🧠",
      Dimension::Spiritual => "✨",
      Dimension::Social => "🤝",
      Dimension::Lifestyle => "🌿",
    }
  }

  /// Match a free-form score label ("Relational Wellness", "social", ...) to a dimension.
  pub fn from_label(label: &str) -> Option<Dimension> {
    let needle = label.trim().to_lowercase();
    Dimension::ALL
      .into_iter()
      .find(|d| d.id() == needle || d.label().to_lowercase() == needle)
  }
}

/// A pre-authored daily check-in question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyQuestion {
  pub id: String,
  pub dimension_id: &'static str,
  pub dimension_label: &'static str,
  pub dimension_icon: &'static str,
  pub text: &'static str,
}

/// One self-assessment score, 0..=5.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
  pub label: String,
  pub score: f64,
}

/// Narrative insight for a set of scores. Keys of `dimension_insights` are dimension ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insight {
  pub narrative: String,
  #[serde(default)]
  pub dimension_insights: BTreeMap<String, String>,
  pub growth_focus: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroChallenge {
  pub title: String,
  pub description: String,
  pub difficulty: Difficulty,
}

/// Daily affirmation + micro-challenge + comfort zone nudge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Touchpoint {
  pub affirmation: String,
  pub challenge: MicroChallenge,
  pub comfort_zone: String,
}

/// Stored assessment with its generated insight (if any).
#[derive(Clone, Debug, PartialEq)]
pub struct Assessment {
  pub id: String,
  pub user_id: String,
  pub scores: Vec<DimensionScore>,
  pub narrative: Option<String>,
  pub dimension_insights: Option<BTreeMap<String, String>>,
  pub growth_focus: Option<String>,
  pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  User,
  Assistant,
}

/// One turn of a conversation forwarded to the text-generation model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
  pub role: Role,
  pub content: String,
}

impl ChatTurn {
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }
}

/// Kind of care provider; selects the dashboard overlays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
  Psychiatrist,
  Therapist,
  #[default]
  Counselor,
}

impl ProviderType {
  pub fn as_str(self) -> &'static str {
    match self {
      ProviderType::Psychiatrist => "psychiatrist",
      ProviderType::Therapist => "therapist",
      ProviderType::Counselor => "counselor",
    }
  }

  /// Unknown values read back from storage are treated as counselors.
  pub fn parse(raw: &str) -> ProviderType {
    match raw.trim().to_lowercase().as_str() {
      "psychiatrist" => ProviderType::Psychiatrist,
      "therapist" => ProviderType::Therapist,
      _ => ProviderType::Counselor,
    }
  }

  pub fn overlays(self) -> [&'static str; 3] {
    match self {
      ProviderType::Psychiatrist => {
        ["Medication change overlay", "Symptom cluster tracking", "Diagnostic-language summaries"]
      }
      ProviderType::Therapist => ["Session prep brief", "Modality suggestions", "Relational dynamics emphasis"],
      ProviderType::Counselor => ["Trajectory snapshot", "Risk flags", "Actionable support prompts"],
    }
  }
}

/// A clinician patients can link to with a short referral code.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Clinician {
  pub code: String,
  #[serde(default)]
  pub provider_type: ProviderType,
  #[serde(default = "default_clinician_name")]
  pub display_name: String,
}

fn default_clinician_name() -> String {
  "Clinician".into()
}

/// Referral codes are case-insensitive and stored upper-case.
pub fn normalize_code(raw: &str) -> String {
  raw.trim().to_uppercase()
}

/// A dimension whose score dropped sharply between a patient's last two assessments.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedChange {
  pub user_id: String,
  pub dimension: String,
  pub delta: f64,
}

/// Aggregate row counts for the operations report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpsCounts {
  pub users: u64,
  pub assessments: u64,
  pub completions: u64,
  pub clinicians: u64,
  pub linked_patients: u64,
}

/// Where a piece of user-facing content came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
  Generated,
  Fallback,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_resolve_to_dimensions() {
    assert_eq!(Dimension::from_label("Relational Wellness"), Some(Dimension::Social));
    assert_eq!(Dimension::from_label(" anxiety "), Some(Dimension::Anxiety));
    assert_eq!(Dimension::from_label("Body & Lifestyle Balance"), Some(Dimension::Lifestyle));
    assert_eq!(Dimension::from_label("finances"), None);
  }

  #[test]
  fn provider_types_parse_leniently() {
    assert_eq!(ProviderType::parse("Therapist"), ProviderType::Therapist);
    assert_eq!(ProviderType::parse("life coach"), ProviderType::Counselor);
    assert_eq!(ProviderType::Psychiatrist.overlays()[0], "Medication change overlay");

    let c: Clinician = toml::from_str(r#"code = "abc123""#).unwrap();
    assert_eq!(c.provider_type, ProviderType::Counselor);
    assert_eq!(c.display_name, "Clinician");
    assert_eq!(normalize_code(" abc123 "), "ABC123");
  }

  #[test]
  fn touchpoint_rejects_unknown_difficulty() {
    let raw = r#"{"affirmation":"a","challenge":{"title":"t","description":"d","difficulty":"extreme"},"comfort_zone":"c"}"#;
    assert!(serde_json::from_str::<Touchpoint>(raw).is_err());
  }
}
