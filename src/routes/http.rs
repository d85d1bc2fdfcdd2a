//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs the caller and basic result info.

use std::sync::Arc;

use axum::{
  async_trait,
  extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
  http::request::Parts,
  Json,
};
use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
const MAX_USER_ID_LEN: usize = 128;

/// Caller identity taken from the `x-user-id` header. Rejects with 401 when missing.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
  type Rejection = AppError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .headers
      .get(USER_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty() && v.len() <= MAX_USER_ID_LEN)
      .map(|v| UserId(v.to_string()))
      .ok_or(AppError::Unauthorized)
  }
}

/// Malformed bodies become 400s with our error shape instead of axum's plain-text rejection.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
  body.map(|Json(b)| b).map_err(|e| AppError::Validation(e.body_text()))
}

fn utc_today() -> NaiveDate {
  Utc::now().date_naive()
}

#[instrument(level = "info")]
pub async fn http_health() -> Json<HealthOut> { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, q), fields(user_id = %user.0, date = ?q.date))]
pub async fn http_get_today(
  State(state): State<Arc<AppState>>,
  user: UserId,
  Query(q): Query<TodayQuery>,
) -> AppResult<Json<TodayOut>> {
  let today = utc_today();
  let date = match q.date.as_deref() {
    Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
      .map_err(|_| AppError::Validation(format!("date must be YYYY-MM-DD, got '{raw}'")))?,
    None => today,
  };
  let out = crate::logic::today(&state, &user.0, today, date).await;
  info!(target: "challenge", user_id = %user.0, %date, completed = out.completed, source = ?out.source, "HTTP today served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %user.0))]
pub async fn http_post_complete(
  State(state): State<Arc<AppState>>,
  user: UserId,
  body: Result<Json<CompleteIn>, JsonRejection>,
) -> AppResult<Json<CompleteOut>> {
  let input = match body {
    // A bare POST with no body is a plain completion.
    Err(JsonRejection::MissingJsonContentType(_)) => CompleteIn::default(),
    other => json_body(other)?,
  };
  let out = complete_challenge(&state, &user.0, utc_today(), input).await?;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(user_id = %user.0))]
pub async fn http_get_streak(State(state): State<Arc<AppState>>, user: UserId) -> Json<StreakOut> {
  let out = streak_for(&state, &user.0).await;
  info!(target: "streak", user_id = %user.0, current = out.current_streak, "HTTP streak served");
  Json(out)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_insight(
  State(state): State<Arc<AppState>>,
  body: Result<Json<ScoresIn>, JsonRejection>,
) -> AppResult<Json<InsightOut>> {
  let scores = validate_scores(json_body(body)?.scores)?;
  let (insight, source) = insight(&state, &scores).await;
  info!(target: "buddy_backend", n_scores = scores.len(), ?source, "HTTP insight served");
  Ok(Json(insight_out(insight, source)))
}

#[instrument(level = "info", skip(state, user, body), fields(user_id = ?user.as_ref().map(|u| u.0.as_str())))]
pub async fn http_post_assessment(
  State(state): State<Arc<AppState>>,
  user: Option<UserId>,
  body: Result<Json<ScoresIn>, JsonRejection>,
) -> AppResult<Json<AssessmentOut>> {
  let scores = validate_scores(json_body(body)?.scores)?;
  let out = submit_assessment(&state, user.as_ref().map(|u| u.0.as_str()), scores).await?;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, user), fields(user_id = ?user.as_ref().map(|u| u.0.as_str())))]
pub async fn http_get_history(State(state): State<Arc<AppState>>, user: Option<UserId>) -> Json<HistoryOut> {
  Json(assessment_history(&state, user.as_ref().map(|u| u.0.as_str())).await)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_simulate(
  State(state): State<Arc<AppState>>,
  body: Result<Json<SimulateIn>, JsonRejection>,
) -> AppResult<Json<SimulateOut>> {
  let out = simulate(&state, json_body(body)?).await?;
  info!(target: "buddy_backend", source = ?out.source, response_len = out.response.len(), "HTTP simulate served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, user), fields(user_id = ?user.as_ref().map(|u| u.0.as_str())))]
pub async fn http_get_share_card(State(state): State<Arc<AppState>>, user: Option<UserId>) -> Json<ShareCardOut> {
  Json(share_card(&state, user.as_ref().map(|u| u.0.as_str())).await)
}

#[instrument(level = "info", skip(state, body), fields(user_id = %user.0))]
pub async fn http_post_clinician_link(
  State(state): State<Arc<AppState>>,
  user: UserId,
  body: Result<Json<LinkIn>, JsonRejection>,
) -> AppResult<Json<LinkOut>> {
  let out = link_clinician(&state, &user.0, json_body(body)?.code).await?;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_clinician_dashboard(
  State(state): State<Arc<AppState>>,
  Path(code): Path<String>,
) -> AppResult<Json<DashboardOut>> {
  let out = clinician_dashboard(&state, &code).await?;
  info!(target: "buddy_backend", code = %out.code, patients = out.patient_count, flagged = out.flagged_changes.len(), "HTTP dashboard served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_ops_report(State(state): State<Arc<AppState>>) -> AppResult<Json<OpsReportOut>> {
  Ok(Json(ops_report(&state).await?))
}
