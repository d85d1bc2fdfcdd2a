//! Request and response bodies for the `/api/v1` JSON endpoints.
//! Field names are camelCase on the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ChatTurn, ContentSource, DailyQuestion, DimensionScore, FlaggedChange, MicroChallenge,
    OpsCounts, ProviderType, StreakState,
};

/// Streak view returned by both the streak and completion endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakOut {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_completions: u32,
    pub last_completed_date: Option<NaiveDate>,
}

impl From<StreakState> for StreakOut {
    fn from(s: StreakState) -> Self {
        Self {
            current_streak: s.current_streak,
            longest_streak: s.longest_streak,
            total_completions: s.total_completions,
            last_completed_date: s.last_completed_date,
        }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteIn {
    #[serde(default)]
    pub challenge_type: Option<String>,
    #[serde(default)]
    pub challenge_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompleteOut {
    /// False when today's completion already existed (no-op).
    pub recorded: bool,
    #[serde(flatten)]
    pub streak: StreakOut,
}

#[derive(Debug, Deserialize)]
pub struct TodayQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayOut {
    /// Today (UTC); `completed` refers to this day.
    pub date: NaiveDate,
    /// Day the questions and touchpoint were generated for (`?date=`, default today).
    pub content_date: NaiveDate,
    pub completed: bool,
    pub questions: Vec<DailyQuestion>,
    pub affirmation: String,
    pub challenge: MicroChallenge,
    pub comfort_zone: String,
    pub source: ContentSource,
}

#[derive(Debug, Deserialize)]
pub struct ScoresIn {
    #[serde(default)]
    pub scores: Option<Vec<DimensionScore>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightOut {
    pub narrative: String,
    pub dimension_insights: BTreeMap<String, String>,
    pub growth_focus: String,
    pub source: ContentSource,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentOut {
    /// Absent for anonymous submissions, which are not persisted.
    pub assessment_id: Option<String>,
    pub scores: Vec<DimensionScore>,
    pub narrative: String,
    pub dimension_insights: BTreeMap<String, String>,
    pub growth_focus: String,
    pub source: ContentSource,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub scores: Vec<DimensionScore>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryOut {
    pub history: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
pub struct SimulateIn {
    #[serde(default)]
    pub situation: Option<String>,
    #[serde(default)]
    pub scores: Option<Vec<DimensionScore>>,
    #[serde(default)]
    pub messages: Option<Vec<ChatTurn>>,
}

#[derive(Debug, Serialize)]
pub struct SimulateOut {
    pub response: String,
    pub source: ContentSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCard {
    pub badge: String,
    pub message: String,
    pub overall_score: Option<f64>,
    pub current_streak: u32,
}

#[derive(Debug, Serialize)]
pub struct ShareCardOut {
    pub card: ShareCard,
}

#[derive(Debug, Deserialize)]
pub struct LinkIn {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOut {
    /// False when the caller was already linked.
    pub linked: bool,
    pub code: String,
    pub display_name: String,
    pub provider_type: ProviderType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientOut {
    pub user_id: String,
    /// Oldest first.
    pub timeline: Vec<HistoryItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOut {
    pub code: String,
    pub display_name: String,
    pub provider_type: ProviderType,
    pub patient_count: usize,
    pub flagged_changes: Vec<FlaggedChange>,
    pub provider_overlays: Vec<String>,
    pub patients: Vec<PatientOut>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpsReportOut {
    pub generated_at: DateTime<Utc>,
    pub build: &'static str,
    pub summary: OpsCounts,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
