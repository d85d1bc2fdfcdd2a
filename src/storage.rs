//! SQLite storage handle (sqlx).
//!
//! The handle is constructed once at startup, injected through `AppState`, and
//! closed explicitly at shutdown. The completion flow runs inside one transaction:
//! the `UNIQUE(user_id, completion_date)` constraint is the idempotency guard, so
//! two concurrent submissions for the same day cannot both advance the streak.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument};

use crate::domain::{
    Assessment, Clinician, CompletionRecord, DimensionScore, OpsCounts, ProviderType, StreakState,
};
use crate::error::{AppError, AppResult};
use crate::streak;

/// Result of appending a completion record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    AlreadyExists,
}

/// Result of the atomic completion flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    Recorded(StreakState),
    AlreadyCompleted(StreakState),
}

impl CompletionOutcome {
    pub fn state(&self) -> StreakState {
        match self {
            CompletionOutcome::Recorded(s) | CompletionOutcome::AlreadyCompleted(s) => *s,
        }
    }

    pub fn recorded(&self) -> bool {
        matches!(self, CompletionOutcome::Recorded(_))
    }
}

#[derive(FromRow)]
struct StreakRow {
    current_streak: i64,
    longest_streak: i64,
    last_completed_date: Option<NaiveDate>,
    total_completions: i64,
}

impl StreakRow {
    fn into_state(self) -> AppResult<StreakState> {
        let to_u32 = |v: i64, field: &str| {
            u32::try_from(v)
                .map_err(|_| AppError::DataIntegrity(format!("streaks.{field} out of range: {v}")))
        };
        Ok(StreakState {
            current_streak: to_u32(self.current_streak, "current_streak")?,
            longest_streak: to_u32(self.longest_streak, "longest_streak")?,
            last_completed_date: self.last_completed_date,
            total_completions: to_u32(self.total_completions, "total_completions")?,
        })
    }
}

#[derive(FromRow)]
struct AssessmentRow {
    id: String,
    user_id: String,
    scores: String,
    narrative: Option<String>,
    dimension_insights: Option<String>,
    growth_focus: Option<String>,
    created_at: DateTime<Utc>,
}

impl AssessmentRow {
    fn into_assessment(self) -> AppResult<Assessment> {
        let scores: Vec<DimensionScore> = serde_json::from_str(&self.scores)?;
        let dimension_insights = self
            .dimension_insights
            .as_deref()
            .map(|raw| serde_json::from_str::<BTreeMap<String, String>>(raw))
            .transpose()?;
        Ok(Assessment {
            id: self.id,
            user_id: self.user_id,
            scores,
            narrative: self.narrative,
            dimension_insights,
            growth_focus: self.growth_focus,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ClinicianRow {
    code: String,
    provider_type: String,
    display_name: String,
}

impl From<ClinicianRow> for Clinician {
    fn from(row: ClinicianRow) -> Self {
        Clinician {
            code: row.code,
            provider_type: ProviderType::parse(&row.provider_type),
            display_name: row.display_name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open the pool (creating the database file if missing) and run migrations.
    #[instrument(level = "info", skip_all, fields(%url, max_connections = max_connections))]
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(target: "buddy_backend", "Storage ready (migrations applied)");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!(target: "buddy_backend", "Storage closed");
    }

    pub async fn get_streak_state(&self, user_id: &str) -> AppResult<Option<StreakState>> {
        let mut conn = self.pool.acquire().await?;
        fetch_streak(&mut conn, user_id).await
    }

    pub async fn has_completed_on(&self, user_id: &str, date: NaiveDate) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM daily_completions WHERE user_id = ?1 AND completion_date = ?2 LIMIT 1",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn record_completion(&self, record: &CompletionRecord) -> AppResult<RecordOutcome> {
        let mut conn = self.pool.acquire().await?;
        insert_completion(&mut conn, record).await
    }

    pub async fn save_streak_state(&self, user_id: &str, state: &StreakState) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_streak(&mut conn, user_id, state).await
    }

    /// Guard, transition and persist as one transaction. A repeat for the same
    /// day returns the stored state untouched.
    #[instrument(level = "info", skip(self, record), fields(user_id = %record.user_id, date = %record.completion_date))]
    pub async fn complete_for_day(&self, record: &CompletionRecord) -> AppResult<CompletionOutcome> {
        let mut tx = self.pool.begin().await?;

        let outcome = match insert_completion(&mut tx, record).await? {
            RecordOutcome::AlreadyExists => {
                let state = fetch_streak(&mut tx, &record.user_id).await?.ok_or_else(|| {
                    AppError::DataIntegrity(format!(
                        "completion exists without streak row for user {}",
                        record.user_id
                    ))
                })?;
                CompletionOutcome::AlreadyCompleted(state)
            }
            RecordOutcome::Inserted => {
                let prior = fetch_streak(&mut tx, &record.user_id).await?;
                let next = streak::transition(prior.as_ref(), record.completion_date);
                upsert_streak(&mut tx, &record.user_id, &next).await?;
                CompletionOutcome::Recorded(next)
            }
        };

        tx.commit().await?;
        debug!(target: "streak", user_id = %record.user_id, recorded = outcome.recorded(), "Completion flow committed");
        Ok(outcome)
    }

    pub async fn insert_assessment(&self, assessment: &Assessment) -> AppResult<()> {
        let scores = serde_json::to_string(&assessment.scores)?;
        let insights = assessment
            .dimension_insights
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO assessments (id, user_id, scores, narrative, dimension_insights, growth_focus, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&assessment.id)
        .bind(&assessment.user_id)
        .bind(scores)
        .bind(&assessment.narrative)
        .bind(insights)
        .bind(&assessment.growth_focus)
        .bind(assessment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Newest first.
    pub async fn recent_assessments(&self, user_id: &str, limit: u32) -> AppResult<Vec<Assessment>> {
        let rows: Vec<AssessmentRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, scores, narrative, dimension_insights, growth_focus, created_at
            FROM assessments
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AssessmentRow::into_assessment).collect()
    }

    pub async fn latest_assessment(&self, user_id: &str) -> AppResult<Option<Assessment>> {
        Ok(self.recent_assessments(user_id, 1).await?.into_iter().next())
    }

    /// Insert or refresh a clinician. `code` is expected to be normalized already.
    pub async fn register_clinician(&self, clinician: &Clinician) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO clinicians (code, provider_type, display_name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(code) DO UPDATE SET
                provider_type = ?2,
                display_name = ?3
            "#,
        )
        .bind(&clinician.code)
        .bind(clinician.provider_type.as_str())
        .bind(&clinician.display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_clinician(&self, code: &str) -> AppResult<Option<Clinician>> {
        let row: Option<ClinicianRow> = sqlx::query_as(
            "SELECT code, provider_type, display_name FROM clinicians WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Clinician::from))
    }

    /// Link a patient to a clinician; linking twice is a no-op.
    pub async fn link_patient(&self, user_id: &str, code: &str) -> AppResult<RecordOutcome> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO patient_clinicians (user_id, clinician_code) VALUES (?1, ?2)",
        )
        .bind(user_id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            RecordOutcome::AlreadyExists
        } else {
            RecordOutcome::Inserted
        })
    }

    pub async fn patient_ids(&self, code: &str) -> AppResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM patient_clinicians WHERE clinician_code = ?1 ORDER BY user_id",
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Every assessment of every patient linked to `code`, oldest first per patient.
    pub async fn patient_assessments(&self, code: &str) -> AppResult<Vec<Assessment>> {
        let rows: Vec<AssessmentRow> = sqlx::query_as(
            r#"
            SELECT a.id, a.user_id, a.scores, a.narrative, a.dimension_insights, a.growth_focus, a.created_at
            FROM assessments a
            JOIN patient_clinicians p ON p.user_id = a.user_id
            WHERE p.clinician_code = ?1
            ORDER BY a.user_id, a.created_at ASC, a.rowid ASC
            "#,
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AssessmentRow::into_assessment).collect()
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn ops_counts(&self) -> AppResult<OpsCounts> {
        let (users, assessments, completions, clinicians, linked_patients): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM (SELECT user_id FROM streaks UNION SELECT user_id FROM assessments)),
                    (SELECT COUNT(*) FROM assessments),
                    (SELECT COUNT(*) FROM daily_completions),
                    (SELECT COUNT(*) FROM clinicians),
                    (SELECT COUNT(DISTINCT user_id) FROM patient_clinicians)
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        let count = |v: i64| u64::try_from(v).unwrap_or_default();
        Ok(OpsCounts {
            users: count(users),
            assessments: count(assessments),
            completions: count(completions),
            clinicians: count(clinicians),
            linked_patients: count(linked_patients),
        })
    }
}

async fn fetch_streak(conn: &mut SqliteConnection, user_id: &str) -> AppResult<Option<StreakState>> {
    let row: Option<StreakRow> = sqlx::query_as(
        r#"
        SELECT current_streak, longest_streak, last_completed_date, total_completions
        FROM streaks WHERE user_id = ?1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(StreakRow::into_state).transpose()
}

async fn insert_completion(
    conn: &mut SqliteConnection,
    record: &CompletionRecord,
) -> AppResult<RecordOutcome> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO daily_completions (user_id, completion_date, challenge_text, challenge_type)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&record.user_id)
    .bind(record.completion_date)
    .bind(&record.challenge_text)
    .bind(&record.challenge_type)
    .execute(&mut *conn)
    .await?;

    Ok(if result.rows_affected() == 0 {
        RecordOutcome::AlreadyExists
    } else {
        RecordOutcome::Inserted
    })
}

async fn upsert_streak(conn: &mut SqliteConnection, user_id: &str, state: &StreakState) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO streaks (user_id, current_streak, longest_streak, last_completed_date, total_completions, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
        ON CONFLICT(user_id) DO UPDATE SET
            current_streak = ?2,
            longest_streak = ?3,
            last_completed_date = ?4,
            total_completions = ?5,
            updated_at = datetime('now')
        "#,
    )
    .bind(user_id)
    .bind(i64::from(state.current_streak))
    .bind(i64::from(state.longest_streak))
    .bind(state.last_completed_date)
    .bind(i64::from(state.total_completions))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) async fn memory_storage() -> Storage {
        Storage::connect("sqlite::memory:", 1).await.expect("open in-memory storage")
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(user: &str, date: &str) -> CompletionRecord {
        CompletionRecord {
            user_id: user.into(),
            completion_date: d(date),
            challenge_text: "Make one brief eye contact".into(),
            challenge_type: "challenge".into(),
        }
    }

    #[tokio::test]
    async fn record_completion_is_unique_per_day() {
        let storage = memory_storage().await;
        let r = record("u1", "2024-03-10");
        assert_eq!(storage.record_completion(&r).await.unwrap(), RecordOutcome::Inserted);
        assert_eq!(storage.record_completion(&r).await.unwrap(), RecordOutcome::AlreadyExists);
        assert!(storage.has_completed_on("u1", d("2024-03-10")).await.unwrap());
        assert!(!storage.has_completed_on("u1", d("2024-03-11")).await.unwrap());
        assert!(!storage.has_completed_on("u2", d("2024-03-10")).await.unwrap());
    }

    #[tokio::test]
    async fn streak_state_round_trips() {
        let storage = memory_storage().await;
        assert_eq!(storage.get_streak_state("u1").await.unwrap(), None);

        let state = StreakState {
            current_streak: 3,
            longest_streak: 5,
            last_completed_date: Some(d("2024-03-10")),
            total_completions: 20,
        };
        storage.save_streak_state("u1", &state).await.unwrap();
        assert_eq!(storage.get_streak_state("u1").await.unwrap(), Some(state));

        let next = StreakState { current_streak: 4, total_completions: 21, ..state };
        storage.save_streak_state("u1", &next).await.unwrap();
        assert_eq!(storage.get_streak_state("u1").await.unwrap(), Some(next));
    }

    #[tokio::test]
    async fn complete_for_day_advances_and_guards() {
        let storage = memory_storage().await;

        let first = storage.complete_for_day(&record("u1", "2024-03-10")).await.unwrap();
        assert!(first.recorded());
        assert_eq!(first.state().current_streak, 1);

        let repeat = storage.complete_for_day(&record("u1", "2024-03-10")).await.unwrap();
        assert_eq!(repeat, CompletionOutcome::AlreadyCompleted(first.state()));

        let next_day = storage.complete_for_day(&record("u1", "2024-03-11")).await.unwrap();
        assert_eq!(
            next_day,
            CompletionOutcome::Recorded(StreakState {
                current_streak: 2,
                longest_streak: 2,
                last_completed_date: Some(d("2024-03-11")),
                total_completions: 2,
            })
        );

        let after_gap = storage.complete_for_day(&record("u1", "2024-03-15")).await.unwrap();
        assert_eq!(after_gap.state().current_streak, 1);
        assert_eq!(after_gap.state().longest_streak, 2);
        assert_eq!(after_gap.state().total_completions, 3);
    }

    #[tokio::test]
    async fn concurrent_same_day_submissions_mutate_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("streaks.db").display());
        let storage = Storage::connect(&url, 4).await.unwrap();

        let a = {
            let storage = storage.clone();
            tokio::spawn(async move { storage.complete_for_day(&record("u1", "2024-03-11")).await })
        };
        let b = {
            let storage = storage.clone();
            tokio::spawn(async move { storage.complete_for_day(&record("u1", "2024-03-11")).await })
        };
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(u8::from(a.recorded()) + u8::from(b.recorded()), 1);
        assert_eq!(a.state(), b.state());
        let stored = storage.get_streak_state("u1").await.unwrap().unwrap();
        assert_eq!(stored.total_completions, 1);
        assert_eq!(stored, a.state());

        storage.close().await;
    }

    #[tokio::test]
    async fn failed_completion_leaves_no_partial_state() {
        let storage = memory_storage().await;
        // A corrupt streak row makes the read after the guard insert fail.
        sqlx::query("INSERT INTO streaks (user_id, current_streak, longest_streak, total_completions) VALUES ('u1', -1, 0, 0)")
            .execute(&storage.pool)
            .await
            .unwrap();

        let result = storage.complete_for_day(&record("u1", "2024-03-10")).await;
        assert!(matches!(result, Err(AppError::DataIntegrity(_))));
        assert!(!storage.has_completed_on("u1", d("2024-03-10")).await.unwrap());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM daily_completions")
            .fetch_one(&storage.pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn clinician_links_and_patient_assessments() {
        let storage = memory_storage().await;
        let clinician = Clinician {
            code: "ABC123".into(),
            provider_type: ProviderType::Therapist,
            display_name: "Dr. Rivera".into(),
        };
        storage.register_clinician(&clinician).await.unwrap();
        assert_eq!(storage.find_clinician("ABC123").await.unwrap(), Some(clinician.clone()));
        assert_eq!(storage.find_clinician("ZZZ999").await.unwrap(), None);

        assert_eq!(storage.link_patient("u2", "ABC123").await.unwrap(), RecordOutcome::Inserted);
        assert_eq!(storage.link_patient("u1", "ABC123").await.unwrap(), RecordOutcome::Inserted);
        assert_eq!(storage.link_patient("u1", "ABC123").await.unwrap(), RecordOutcome::AlreadyExists);
        assert!(storage.link_patient("u1", "ZZZ999").await.is_err());
        assert_eq!(storage.patient_ids("ABC123").await.unwrap(), vec!["u1", "u2"]);

        let base = Utc::now();
        for (i, user) in ["u1", "u1", "outsider"].into_iter().enumerate() {
            storage
                .insert_assessment(&Assessment {
                    id: format!("a{i}"),
                    user_id: user.into(),
                    scores: vec![DimensionScore { label: "Relational Wellness".into(), score: 3.0 }],
                    narrative: None,
                    dimension_insights: None,
                    growth_focus: None,
                    created_at: base + chrono::Duration::seconds(i as i64),
                })
                .await
                .unwrap();
        }
        let ids: Vec<String> = storage
            .patient_assessments("ABC123")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["a0", "a1"]);

        storage.complete_for_day(&record("u3", "2024-03-10")).await.unwrap();
        assert_eq!(
            storage.ops_counts().await.unwrap(),
            OpsCounts { users: 3, assessments: 3, completions: 1, clinicians: 1, linked_patients: 2 }
        );
    }

    #[tokio::test]
    async fn assessments_come_back_newest_first() {
        let storage = memory_storage().await;
        let base = Utc::now();
        for i in 0..4 {
            storage
                .insert_assessment(&Assessment {
                    id: format!("a{i}"),
                    user_id: "u1".into(),
                    scores: vec![DimensionScore { label: "Emotional Resilience".into(), score: f64::from(i) }],
                    narrative: Some(format!("n{i}")),
                    dimension_insights: (i % 2 == 0)
                        .then(|| BTreeMap::from([("emotional".to_string(), "breathe".to_string())])),
                    growth_focus: None,
                    created_at: base + chrono::Duration::seconds(i64::from(i)),
                })
                .await
                .unwrap();
        }

        let recent = storage.recent_assessments("u1", 3).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a3", "a2", "a1"]);
        assert_eq!(recent[1].dimension_insights.as_ref().unwrap()["emotional"], "breathe");
        assert_eq!(recent[0].scores[0].score, 3.0);

        assert_eq!(storage.latest_assessment("u1").await.unwrap().unwrap().id, "a3");
        assert!(storage.latest_assessment("nobody").await.unwrap().is_none());
    }
}
