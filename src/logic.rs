//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Recording a daily completion and reading streaks
//!   - Today's touchpoint (rotated questions + generated or fallback content)
//!   - Assessment insights, submission and history
//!   - The social-situation simulator
//!   - The shareable wellness card
//!   - Clinician links, the clinician dashboard and the ops report
//!
//! Every model call goes through `generate_bounded`; its failures are logged and
//! replaced by static content, so none of these flows blocks on the model.

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clinician;
use crate::domain::{
  normalize_code, Assessment, ChatTurn, CompletionRecord, ContentSource, Dimension, DimensionScore,
  Insight, Role, StreakState, Touchpoint,
};
use crate::error::{AppError, AppResult};
use crate::openai::LlmError;
use crate::protocol::{
  AssessmentOut, CompleteIn, CompleteOut, DashboardOut, HistoryItem, HistoryOut, InsightOut, LinkOut,
  OpsReportOut, PatientOut, ShareCard, ShareCardOut, SimulateIn, SimulateOut, StreakOut, TodayOut,
};
use crate::rotation::select_for_date;
use crate::seeds::{
  fallback_dimension_insight, fallback_dimension_insights, fallback_touchpoint, SIMULATE_FALLBACKS,
};
use crate::state::AppState;
use crate::storage::RecordOutcome;
use crate::util::{fill_template, format_scores, strip_code_fences, trunc_for_log};

pub const DEFAULT_CHALLENGE_TYPE: &str = "challenge";
const MAX_CHALLENGE_TYPE_LEN: usize = 64;
const MAX_CHALLENGE_TEXT_LEN: usize = 2_000;
const MAX_SCORES: usize = 20;
const MAX_SIM_TURNS: usize = 40;
const HISTORY_LIMIT: u32 = 3;

const TOUCHPOINT_MAX_TOKENS: u32 = 400;
const INSIGHT_MAX_TOKENS: u32 = 500;
const SIMULATE_MAX_TOKENS: u32 = 250;

/// Call the generator with a hard deadline. `Disabled` when no model is configured.
pub async fn generate_bounded(
  state: &AppState,
  system: &str,
  turns: &[ChatTurn],
  max_tokens: u32,
) -> Result<String, LlmError> {
  let generator = state.generator.as_ref().ok_or(LlmError::Disabled)?;
  match tokio::time::timeout(state.llm_timeout, generator.generate(system, turns, max_tokens)).await {
    Ok(result) => result,
    Err(_) => Err(LlmError::Timeout(state.llm_timeout)),
  }
}

/// Strip formatting around a model's JSON answer and decode it.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
  serde_json::from_str::<T>(strip_code_fences(raw))
    .map_err(|e| LlmError::Parse(format!("{e}; raw={}", trunc_for_log(raw, 120))))
}

// -------- Streaks --------

#[instrument(level = "info", skip(state, input), fields(%user_id, %today))]
pub async fn complete_challenge(
  state: &AppState,
  user_id: &str,
  today: NaiveDate,
  input: CompleteIn,
) -> AppResult<CompleteOut> {
  let challenge_type = match input.challenge_type.map(|t| t.trim().to_string()) {
    None => DEFAULT_CHALLENGE_TYPE.to_string(),
    Some(t) if t.is_empty() => return Err(AppError::Validation("challengeType must not be empty".into())),
    Some(t) if t.chars().count() > MAX_CHALLENGE_TYPE_LEN => {
      return Err(AppError::Validation(format!("challengeType longer than {MAX_CHALLENGE_TYPE_LEN} characters")))
    }
    Some(t) => t,
  };
  let challenge_text = input.challenge_text.unwrap_or_default();
  if challenge_text.chars().count() > MAX_CHALLENGE_TEXT_LEN {
    return Err(AppError::Validation(format!("challengeText longer than {MAX_CHALLENGE_TEXT_LEN} characters")));
  }

  let record = CompletionRecord {
    user_id: user_id.to_string(),
    completion_date: today,
    challenge_text,
    challenge_type,
  };
  let outcome = state.storage.complete_for_day(&record).await?;
  let streak = outcome.state();
  info!(
    target: "streak",
    %user_id,
    recorded = outcome.recorded(),
    current = streak.current_streak,
    longest = streak.longest_streak,
    total = streak.total_completions,
    "Completion processed"
  );

  Ok(CompleteOut { recorded: outcome.recorded(), streak: streak.into() })
}

/// Stored streak, or zeros when the user has none or the read fails.
#[instrument(level = "info", skip(state), fields(%user_id))]
pub async fn streak_for(state: &AppState, user_id: &str) -> StreakOut {
  let streak = state.storage.get_streak_state(user_id).await.unwrap_or_else(|e| {
    error!(target: "streak", %user_id, error = %e, "Streak lookup failed; reporting empty streak");
    None
  });
  streak.unwrap_or(StreakState::EMPTY).into()
}

// -------- Today --------

/// Rotated questions for `date`, completion status for `today`, and a touchpoint.
#[instrument(level = "info", skip(state), fields(%user_id, %today, %date))]
pub async fn today(state: &AppState, user_id: &str, today: NaiveDate, date: NaiveDate) -> TodayOut {
  let completed = state
    .storage
    .has_completed_on(user_id, today)
    .await
    .unwrap_or_else(|e| {
      error!(target: "challenge", %user_id, error = %e, "Completion lookup failed; reporting not completed");
      false
    });

  let scores = match state.storage.latest_assessment(user_id).await {
    Ok(latest) => latest.map(|a| a.scores),
    Err(e) => {
      warn!(target: "challenge", %user_id, error = %e, "Latest assessment lookup failed; touchpoint not personalised");
      None
    }
  };

  let (touchpoint, source) = touchpoint_for(state, date, scores.as_deref()).await;
  TodayOut {
    date: today,
    content_date: date,
    completed,
    questions: select_for_date(date),
    affirmation: touchpoint.affirmation,
    challenge: touchpoint.challenge,
    comfort_zone: touchpoint.comfort_zone,
    source,
  }
}

async fn touchpoint_for(
  state: &AppState,
  date: NaiveDate,
  scores: Option<&[DimensionScore]>,
) -> (Touchpoint, ContentSource) {
  let score_context = score_context(scores);
  let date_str = date.format("%Y-%m-%d").to_string();
  let prompt = fill_template(
    &state.prompts.touchpoint_user_template,
    &[("date", &date_str), ("score_context", &score_context)],
  );

  let result = generate_bounded(state, &state.prompts.touchpoint_system, &[ChatTurn::user(prompt)], TOUCHPOINT_MAX_TOKENS)
    .await
    .and_then(|raw| parse_model_json::<Touchpoint>(&raw))
    .and_then(|t| {
      let blank = [&t.affirmation, &t.challenge.title, &t.challenge.description, &t.comfort_zone]
        .iter()
        .any(|s| s.trim().is_empty());
      if blank { Err(LlmError::Parse("touchpoint has empty fields".into())) } else { Ok(t) }
    });

  match result {
    Ok(t) => (t, ContentSource::Generated),
    Err(e) => {
      warn!(target: "challenge", %date, error = %e, "Touchpoint generation failed; using fallback");
      (fallback_touchpoint(), ContentSource::Fallback)
    }
  }
}

fn score_context(scores: Option<&[DimensionScore]>) -> String {
  match scores {
    Some(s) if !s.is_empty() => format!("Their wellness profile: {}", format_scores(s, ", ")),
    _ => String::new(),
  }
}

// -------- Insights & assessments --------

/// Reject missing, empty, oversized or out-of-range score lists.
pub fn validate_scores(scores: Option<Vec<DimensionScore>>) -> AppResult<Vec<DimensionScore>> {
  let scores = scores.ok_or_else(|| AppError::Validation("scores array required".into()))?;
  if scores.is_empty() {
    return Err(AppError::Validation("scores array must not be empty".into()));
  }
  if scores.len() > MAX_SCORES {
    return Err(AppError::Validation(format!("at most {MAX_SCORES} scores allowed")));
  }
  for s in &scores {
    if s.label.trim().is_empty() {
      return Err(AppError::Validation("score label must not be empty".into()));
    }
    if !s.score.is_finite() || !(0.0..=5.0).contains(&s.score) {
      return Err(AppError::Validation(format!("score for '{}' must be between 0 and 5", s.label)));
    }
  }
  Ok(scores)
}

/// Model insight, or the local one if the model is unavailable or misbehaves.
#[instrument(level = "info", skip(state, scores), fields(n_scores = scores.len()))]
pub async fn insight(state: &AppState, scores: &[DimensionScore]) -> (Insight, ContentSource) {
  let prompt = fill_template(
    &state.prompts.insight_user_template,
    &[("score_lines", &format_scores(scores, "\n"))],
  );

  let result = generate_bounded(state, &state.prompts.insight_system, &[ChatTurn::user(prompt)], INSIGHT_MAX_TOKENS)
    .await
    .and_then(|raw| parse_model_json::<Insight>(&raw))
    .and_then(|i| {
      if i.narrative.trim().is_empty() || i.growth_focus.trim().is_empty() {
        Err(LlmError::Parse("insight has empty narrative or growth focus".into()))
      } else {
        Ok(i)
      }
    });

  match result {
    Ok(mut i) => {
      for dim in Dimension::ALL {
        i.dimension_insights
          .entry(dim.id().to_string())
          .or_insert_with(|| fallback_dimension_insight(dim).to_string());
      }
      (i, ContentSource::Generated)
    }
    Err(e) => {
      warn!(target: "buddy_backend", error = %e, "Insight generation failed; using local insight");
      (local_insight(scores), ContentSource::Fallback)
    }
  }
}

/// Deterministic insight from the scores alone. `scores` must be non-empty.
pub fn local_insight(scores: &[DimensionScore]) -> Insight {
  let by_score = |a: &&DimensionScore, b: &&DimensionScore| a.score.total_cmp(&b.score);
  let weakest = scores.iter().min_by(by_score);
  // max_by returns the last maximum; reverse so ties keep the first one.
  let strongest = scores.iter().rev().max_by(by_score);

  let (narrative, growth_focus) = match (strongest, weakest) {
    (Some(strong), Some(weak)) if scores.len() > 1 && strong.score > weak.score => (
      format!(
        "You're showing real strength in {} ({}/5), and that's worth noticing. {} ({}/5) is where a little gentle attention this week could make the biggest difference.",
        strong.label, strong.score, weak.label, weak.score
      ),
      weak.label.clone(),
    ),
    (_, Some(weak)) => (
      format!(
        "You've taken an honest look at how you're doing, which is a real first step. Your scores sit around {}/5, so pick one small area and give it some care this week.",
        weak.score
      ),
      weak.label.clone(),
    ),
    _ => (String::new(), String::new()),
  };

  let dimension_insights = fallback_dimension_insights();
  // Point at the concrete step for the focus area when its label is a known dimension.
  let narrative = match Dimension::from_label(&growth_focus) {
    Some(dim) => format!("{narrative} {}", fallback_dimension_insight(dim)),
    None => narrative,
  };

  Insight { narrative, dimension_insights, growth_focus }
}

pub fn insight_out(insight: Insight, source: ContentSource) -> InsightOut {
  InsightOut {
    narrative: insight.narrative,
    dimension_insights: insight.dimension_insights,
    growth_focus: insight.growth_focus,
    source,
  }
}

/// Compute the insight and persist the assessment for identified callers.
#[instrument(level = "info", skip(state, scores), fields(user_id = ?user_id, n_scores = scores.len()))]
pub async fn submit_assessment(
  state: &AppState,
  user_id: Option<&str>,
  scores: Vec<DimensionScore>,
) -> AppResult<AssessmentOut> {
  let (insight, source) = insight(state, &scores).await;

  let assessment_id = match user_id {
    Some(uid) => {
      let assessment = Assessment {
        id: Uuid::new_v4().to_string(),
        user_id: uid.to_string(),
        scores: scores.clone(),
        narrative: Some(insight.narrative.clone()),
        dimension_insights: Some(insight.dimension_insights.clone()),
        growth_focus: Some(insight.growth_focus.clone()),
        created_at: chrono::Utc::now(),
      };
      state.storage.insert_assessment(&assessment).await?;
      info!(target: "buddy_backend", user_id = %uid, assessment_id = %assessment.id, "Assessment stored");
      Some(assessment.id)
    }
    None => None,
  };

  Ok(AssessmentOut {
    assessment_id,
    scores,
    narrative: insight.narrative,
    dimension_insights: insight.dimension_insights,
    growth_focus: insight.growth_focus,
    source,
  })
}

/// Latest assessments for the caller; anonymous callers and storage failures get an empty list.
#[instrument(level = "info", skip(state), fields(user_id = ?user_id))]
pub async fn assessment_history(state: &AppState, user_id: Option<&str>) -> HistoryOut {
  let Some(uid) = user_id else {
    return HistoryOut { history: Vec::new() };
  };
  let history = match state.storage.recent_assessments(uid, HISTORY_LIMIT).await {
    Ok(rows) => rows
      .into_iter()
      .map(|a| HistoryItem { scores: a.scores, created_at: a.created_at })
      .collect(),
    Err(e) => {
      error!(target: "buddy_backend", user_id = %uid, error = %e, "Assessment history lookup failed");
      Vec::new()
    }
  };
  HistoryOut { history }
}

// -------- Simulator --------

#[instrument(level = "info", skip(state, input))]
pub async fn simulate(state: &AppState, input: SimulateIn) -> AppResult<SimulateOut> {
  let situation = input
    .situation
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .ok_or_else(|| AppError::Validation("situation and messages required".into()))?;
  let turns = input
    .messages
    .filter(|m| !m.is_empty())
    .ok_or_else(|| AppError::Validation("situation and messages required".into()))?;
  if turns.len() > MAX_SIM_TURNS {
    return Err(AppError::Validation(format!("at most {MAX_SIM_TURNS} messages allowed")));
  }
  if turns.iter().any(|t| t.content.trim().is_empty()) {
    return Err(AppError::Validation("messages must not be empty".into()));
  }
  if turns.last().map(|t| t.role) != Some(Role::User) {
    return Err(AppError::Validation("last message must come from the user".into()));
  }

  let system = fill_template(
    &state.prompts.simulate_system_template,
    &[("situation", &situation), ("score_context", &score_context(input.scores.as_deref()))],
  );

  match generate_bounded(state, &system, &turns, SIMULATE_MAX_TOKENS).await {
    Ok(response) => Ok(SimulateOut { response, source: ContentSource::Generated }),
    Err(e) => {
      warn!(target: "buddy_backend", turns = turns.len(), error = %e, "Simulator reply failed; using fallback");
      let response = SIMULATE_FALLBACKS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(SIMULATE_FALLBACKS[0])
        .to_string();
      Ok(SimulateOut { response, source: ContentSource::Fallback })
    }
  }
}

// -------- Share card --------

pub fn badge_for(score: f64) -> &'static str {
  if score >= 4.5 {
    "🌟 Resilience Champion"
  } else if score >= 4.0 {
    "💪 Growing Strong"
  } else if score >= 3.5 {
    "🌱 Steady Progress"
  } else if score >= 3.0 {
    "🔥 Building Momentum"
  } else if score >= 2.5 {
    "💜 Honest Explorer"
  } else {
    "🌱 Starting Strong"
  }
}

pub fn message_for(score: f64) -> &'static str {
  if score >= 4.0 {
    "You've built real emotional strength. Keep nurturing what's working."
  } else if score >= 3.0 {
    "You're doing the honest work. Every step forward counts."
  } else {
    "Awareness is the first act of courage. You're already doing it."
  }
}

/// Average rounded to one decimal.
pub fn overall_score(scores: &[DimensionScore]) -> Option<f64> {
  if scores.is_empty() {
    return None;
  }
  let avg = scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64;
  Some((avg * 10.0).round() / 10.0)
}

#[instrument(level = "info", skip(state), fields(user_id = ?user_id))]
pub async fn share_card(state: &AppState, user_id: Option<&str>) -> ShareCardOut {
  let starter = |message: &str, current_streak: u32| ShareCardOut {
    card: ShareCard {
      badge: badge_for(0.0).to_string(),
      message: message.to_string(),
      overall_score: None,
      current_streak,
    },
  };

  let Some(uid) = user_id else {
    return starter("Awareness is the first act of courage.", 0);
  };

  let current_streak = match state.storage.get_streak_state(uid).await {
    Ok(s) => s.map(|s| s.current_streak).unwrap_or(0),
    Err(e) => {
      warn!(target: "buddy_backend", user_id = %uid, error = %e, "Streak lookup failed for share card");
      0
    }
  };

  match state.storage.latest_assessment(uid).await {
    Ok(Some(a)) => match overall_score(&a.scores) {
      Some(overall) => ShareCardOut {
        card: ShareCard {
          badge: badge_for(overall).to_string(),
          message: message_for(overall).to_string(),
          overall_score: Some(overall),
          current_streak,
        },
      },
      None => starter("Complete your first assessment to unlock your wellness card.", current_streak),
    },
    Ok(None) => starter("Complete your first assessment to unlock your wellness card.", current_streak),
    Err(e) => {
      error!(target: "buddy_backend", user_id = %uid, error = %e, "Share card lookup failed");
      starter("Keep going. Every step counts.", current_streak)
    }
  }
}

// -------- Clinicians & ops --------

#[instrument(level = "info", skip(state), fields(%user_id))]
pub async fn link_clinician(state: &AppState, user_id: &str, code: Option<String>) -> AppResult<LinkOut> {
  let code = code
    .map(|c| normalize_code(&c))
    .filter(|c| !c.is_empty())
    .ok_or_else(|| AppError::Validation("clinician code required".into()))?;
  let clinician = state
    .storage
    .find_clinician(&code)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("clinician {code}")))?;

  let outcome = state.storage.link_patient(user_id, &clinician.code).await?;
  info!(target: "buddy_backend", %user_id, %code, linked = outcome == RecordOutcome::Inserted, "Patient linked to clinician");
  Ok(LinkOut {
    linked: outcome == RecordOutcome::Inserted,
    code: clinician.code,
    display_name: clinician.display_name,
    provider_type: clinician.provider_type,
  })
}

/// Patient timelines for a clinician code, with sharp drops between each
/// patient's last two assessments flagged.
#[instrument(level = "info", skip(state))]
pub async fn clinician_dashboard(state: &AppState, code: &str) -> AppResult<DashboardOut> {
  let code = normalize_code(code);
  let profile = state
    .storage
    .find_clinician(&code)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("clinician {code}")))?;

  let patient_ids = state.storage.patient_ids(&code).await?;
  let timelines = clinician::group_timelines(&patient_ids, state.storage.patient_assessments(&code).await?);
  let flagged_changes = clinician::flag_timelines(&timelines);
  if !flagged_changes.is_empty() {
    warn!(target: "buddy_backend", %code, flagged = flagged_changes.len(), "Dashboard has flagged score drops");
  }

  let patients = timelines
    .into_iter()
    .map(|(user_id, timeline)| PatientOut {
      user_id,
      timeline: timeline
        .into_iter()
        .map(|a| HistoryItem { scores: a.scores, created_at: a.created_at })
        .collect(),
    })
    .collect();

  Ok(DashboardOut {
    code: profile.code,
    display_name: profile.display_name,
    provider_type: profile.provider_type,
    patient_count: patient_ids.len(),
    flagged_changes,
    provider_overlays: profile.provider_type.overlays().iter().map(|o| o.to_string()).collect(),
    patients,
  })
}

pub async fn ops_report(state: &AppState) -> AppResult<OpsReportOut> {
  Ok(OpsReportOut {
    generated_at: chrono::Utc::now(),
    build: env!("CARGO_PKG_VERSION"),
    summary: state.storage.ops_counts().await?,
  })
}
