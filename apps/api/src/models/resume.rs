//! Per-document state for the processing pipeline.
//!
//! `ResumeStatus` is an explicit finite-state machine, not a free-form string:
//! every transition goes through [`ResumeStatus::next`] and anything outside
//! the table is rejected at the store layer. The terminal-write SQL carries a
//! matching `WHERE status = 'parsing'` guard so concurrent redeliveries stay
//! safe without any in-process lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeStatus {
    Uploaded,
    Parsing,
    Completed,
    Failed,
}

/// Events that move a resume through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeEvent {
    /// Dispatcher hands the document to the queue.
    Dispatch,
    /// Worker wrote extraction + score.
    Succeed,
    /// Worker recorded a per-document failure.
    Fail,
}

impl ResumeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeStatus::Uploaded => "uploaded",
            ResumeStatus::Parsing => "parsing",
            ResumeStatus::Completed => "completed",
            ResumeStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResumeStatus::Completed | ResumeStatus::Failed)
    }

    /// The transition table. Returns the successor status, or `None` when the
    /// event is not legal from `self`.
    ///
    /// Note `Parsing` is deliberately not re-dispatchable: a resume whose
    /// worker crashed before writing a terminal status stays put until an
    /// operator intervenes. A future stale-lease rule would be one more arm
    /// here, nowhere else.
    pub fn next(self, event: ResumeEvent) -> Option<ResumeStatus> {
        match (self, event) {
            (ResumeStatus::Uploaded, ResumeEvent::Dispatch) => Some(ResumeStatus::Parsing),
            (ResumeStatus::Failed, ResumeEvent::Dispatch) => Some(ResumeStatus::Parsing),
            (ResumeStatus::Parsing, ResumeEvent::Succeed) => Some(ResumeStatus::Completed),
            (ResumeStatus::Parsing, ResumeEvent::Fail) => Some(ResumeStatus::Failed),
            _ => None,
        }
    }

    /// Statuses the dispatcher treats as eligible for (re)processing.
    pub fn is_dispatchable(&self) -> bool {
        self.next(ResumeEvent::Dispatch).is_some()
    }
}

impl std::str::FromStr for ResumeStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "uploaded" => Ok(ResumeStatus::Uploaded),
            "parsing" => Ok(ResumeStatus::Parsing),
            "completed" => Ok(ResumeStatus::Completed),
            "failed" => Ok(ResumeStatus::Failed),
            other => Err(format!("unknown resume status '{other}'")),
        }
    }
}

// The `status` column is TEXT, so the enum maps through its string form
// rather than a database enum type.
impl sqlx::Type<sqlx::Postgres> for ResumeStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for ResumeStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ResumeStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(raw.parse()?)
    }
}

/// Structured fields pulled out of the document by the scoring collaborator.
/// Decoded once at the store boundary; read sites never re-parse raw JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub experience_years: Option<f64>,
}

/// Per-dimension scoring detail. `rank` is written by the ranking pass and is
/// absent until the first pass over this job completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub experience_years: Option<f64>,
    #[serde(default)]
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub status: ResumeStatus,
    pub error_message: Option<String>,
    pub overall_score: Option<f64>,
    pub score_breakdown: Option<Json<ScoreBreakdown>>,
    pub extracted_fields: Option<Json<ExtractedFields>>,
    pub extracted_text: Option<String>,
    /// Opaque object-storage key; the pipeline passes it through to the
    /// scoring collaborator and never reads the bytes itself.
    pub source_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ocr_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ResumeRow {
    /// Rank hint persisted by the last ranking pass, if any.
    pub fn persisted_rank(&self) -> Option<i64> {
        self.score_breakdown.as_ref().and_then(|b| b.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_is_legal_from_uploaded_and_failed_only() {
        assert_eq!(
            ResumeStatus::Uploaded.next(ResumeEvent::Dispatch),
            Some(ResumeStatus::Parsing)
        );
        assert_eq!(
            ResumeStatus::Failed.next(ResumeEvent::Dispatch),
            Some(ResumeStatus::Parsing)
        );
        assert_eq!(ResumeStatus::Parsing.next(ResumeEvent::Dispatch), None);
        assert_eq!(ResumeStatus::Completed.next(ResumeEvent::Dispatch), None);
    }

    #[test]
    fn terminal_writes_require_parsing() {
        assert_eq!(
            ResumeStatus::Parsing.next(ResumeEvent::Succeed),
            Some(ResumeStatus::Completed)
        );
        assert_eq!(
            ResumeStatus::Parsing.next(ResumeEvent::Fail),
            Some(ResumeStatus::Failed)
        );
        for status in [
            ResumeStatus::Uploaded,
            ResumeStatus::Completed,
            ResumeStatus::Failed,
        ] {
            assert_eq!(status.next(ResumeEvent::Succeed), None);
            assert_eq!(status.next(ResumeEvent::Fail), None);
        }
    }

    #[test]
    fn dispatchable_matches_transition_table() {
        assert!(ResumeStatus::Uploaded.is_dispatchable());
        assert!(ResumeStatus::Failed.is_dispatchable());
        assert!(!ResumeStatus::Parsing.is_dispatchable());
        assert!(!ResumeStatus::Completed.is_dispatchable());
    }

    #[test]
    fn status_column_type_is_sql_text() {
        use sqlx::{Postgres, Type};
        let text = <&str as Type<Postgres>>::type_info();
        assert_eq!(<ResumeStatus as Type<Postgres>>::type_info(), text);
        assert!(<ResumeStatus as Type<Postgres>>::compatible(&text));
    }

    #[test]
    fn status_round_trips_through_its_text_form() {
        for status in [
            ResumeStatus::Uploaded,
            ResumeStatus::Parsing,
            ResumeStatus::Completed,
            ResumeStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ResumeStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<ResumeStatus>().is_err());
    }

    #[test]
    fn breakdown_decodes_legacy_payload_without_rank() {
        let breakdown: ScoreBreakdown =
            serde_json::from_str(r#"{"skills":["rust","sql"],"summary":"solid"}"#).unwrap();
        assert_eq!(breakdown.skills.len(), 2);
        assert!(breakdown.rank.is_none());
    }
}
