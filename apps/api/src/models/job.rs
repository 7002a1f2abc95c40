use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Job-level lifecycle of the most recent ranking pass.
///
/// `Idle → Processing → {Completed | Failed}`, and any terminal state back to
/// `Processing` on a new ranking request (re-ranking always restarts clean).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortingState {
    Idle,
    Processing,
    Completed,
    Failed,
}

impl SortingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortingState::Idle => "idle",
            SortingState::Processing => "processing",
            SortingState::Completed => "completed",
            SortingState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SortingState::Completed | SortingState::Failed)
    }
}

impl std::str::FromStr for SortingState {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "idle" => Ok(SortingState::Idle),
            "processing" => Ok(SortingState::Processing),
            "completed" => Ok(SortingState::Completed),
            "failed" => Ok(SortingState::Failed),
            other => Err(format!("unknown sorting state '{other}'")),
        }
    }
}

// The `sorting_state` column is TEXT, so the enum maps through its string
// form rather than a database enum type.
impl sqlx::Type<sqlx::Postgres> for SortingState {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for SortingState {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for SortingState {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(raw.parse()?)
    }
}

/// Structured hiring requirements attached to a job posting.
/// `top_candidates` is the optional target shortlist size; when absent the
/// shortlist defaults to every completed resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub top_candidates: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobPostingRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub requirements: Json<JobRequirements>,
    pub sorting_state: SortingState,
    pub sorted_count: i64,
    pub analyzed_count: i64,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorting_state_text_round_trip() {
        for state in [
            SortingState::Idle,
            SortingState::Processing,
            SortingState::Completed,
            SortingState::Failed,
        ] {
            let as_json = serde_json::to_string(&state).unwrap();
            assert_eq!(as_json, format!("\"{}\"", state.as_str()));
            let back: SortingState = serde_json::from_str(&as_json).unwrap();
            assert_eq!(back, state);
        }
    }

    #[test]
    fn sorting_state_column_type_is_sql_text() {
        use sqlx::{Postgres, Type};
        let text = <&str as Type<Postgres>>::type_info();
        assert_eq!(<SortingState as Type<Postgres>>::type_info(), text);
        assert!(<SortingState as Type<Postgres>>::compatible(&text));
    }

    #[test]
    fn sorting_state_parses_from_its_text_form() {
        for state in [
            SortingState::Idle,
            SortingState::Processing,
            SortingState::Completed,
            SortingState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<SortingState>().unwrap(), state);
        }
        assert!("sorted".parse::<SortingState>().is_err());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!SortingState::Idle.is_terminal());
        assert!(!SortingState::Processing.is_terminal());
        assert!(SortingState::Completed.is_terminal());
        assert!(SortingState::Failed.is_terminal());
    }

    #[test]
    fn requirements_tolerate_missing_fields() {
        let req: JobRequirements = serde_json::from_str("{}").unwrap();
        assert!(req.required_skills.is_empty());
        assert!(req.top_candidates.is_none());
    }
}
