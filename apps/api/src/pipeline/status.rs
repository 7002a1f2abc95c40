//! Status/Results Reader — read-only views over the record store.
//!
//! The shortlist uses the same comparator as the ranking pass, so stage
//! assignment is consistent whether or not a ranking pass has persisted
//! ranks yet.

use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::errors::AppError;
use crate::models::job::{JobPostingRow, SortingState};
use crate::models::resume::ResumeRow;
use crate::pipeline::ranking::{clamp_top, cmp_ranked};
use crate::queue::{QueueTaskState, TaskQueue};
use crate::store::{self, StatusCounts};

#[derive(Debug, Serialize)]
pub struct SortingStatus {
    pub sorting_state: SortingState,
    pub sorted_count: i64,
    pub analyzed_count: i64,
    pub last_activity_at: chrono::DateTime<chrono::Utc>,
    pub counts: StatusCounts,
    /// Broker-reported state of the probed task; `None` when no task id was
    /// given or the probe failed.
    pub queue_status: Option<QueueTaskState>,
}

/// Stage assigned to a shortlist candidate. This read path never produces
/// "rejected" — rejection is an externally driven status, not a pipeline
/// outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Shortlist,
    Hold,
}

#[derive(Debug, Serialize)]
pub struct ShortlistCandidate {
    pub id: Uuid,
    pub stage: Stage,
    pub name: String,
    /// Normalized 0–100 integer score.
    pub match_score: i64,
    pub matched_skills: Vec<String>,
    pub experience: Option<f64>,
    pub summary: Option<String>,
    pub rank: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Shortlist {
    pub required_skills: Vec<String>,
    pub shortlist_size: i64,
    pub candidates: Vec<ShortlistCandidate>,
}

pub async fn sorting_status(
    pool: &PgPool,
    queue: &dyn TaskQueue,
    ctx: &RequestContext,
    job_id: Uuid,
    task_id: Option<&str>,
) -> Result<SortingStatus, AppError> {
    let job = store::fetch_job(pool, ctx.tenant_id, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    let counts = store::status_counts(pool, job.id).await?;

    // Best effort: a broker hiccup must not fail a pure read.
    let queue_status = match task_id {
        Some(task_id) => match queue.task_state(task_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(task_id, error = %e, "queue probe failed, reporting null");
                None
            }
        },
        None => None,
    };

    Ok(SortingStatus {
        sorting_state: job.sorting_state,
        sorted_count: job.sorted_count,
        analyzed_count: job.analyzed_count,
        last_activity_at: job.last_activity_at,
        counts,
        queue_status,
    })
}

pub async fn shortlist(
    pool: &PgPool,
    ctx: &RequestContext,
    job_id: Uuid,
) -> Result<Shortlist, AppError> {
    let job = store::fetch_job(pool, ctx.tenant_id, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    let rows = store::completed_resumes(pool, job.id).await?;
    Ok(build_shortlist(&job, rows))
}

/// Pure shortlist assembly over the completed snapshot.
pub fn build_shortlist(job: &JobPostingRow, mut rows: Vec<ResumeRow>) -> Shortlist {
    rows.sort_by(cmp_ranked);

    let completed = rows.len() as i64;
    let shortlist_size = clamp_top(job.requirements.top_candidates, completed);

    let candidates = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let position = i as i64 + 1;
            let persisted = row.persisted_rank();
            // Persisted rank from the last pass wins; position in the
            // freshly computed order stands in until a pass has run.
            let effective_rank = persisted.unwrap_or(position);
            let stage = if effective_rank <= shortlist_size {
                Stage::Shortlist
            } else {
                Stage::Hold
            };

            let fields = row.extracted_fields.as_ref().map(|j| &j.0);
            let breakdown = row.score_breakdown.as_ref().map(|j| &j.0);

            let name = fields
                .and_then(|f| f.name.clone())
                .unwrap_or_else(|| format!("Candidate {position}"));
            let skills: &[String] = breakdown
                .filter(|b| !b.skills.is_empty())
                .map(|b| b.skills.as_slice())
                .or_else(|| fields.map(|f| f.skills.as_slice()))
                .unwrap_or(&[]);

            ShortlistCandidate {
                id: row.id,
                stage,
                name,
                match_score: normalize_score(row.overall_score.unwrap_or(0.0)),
                matched_skills: matched_skills(skills, &job.requirements.required_skills),
                experience: breakdown
                    .and_then(|b| b.experience_years)
                    .or_else(|| fields.and_then(|f| f.experience_years)),
                summary: breakdown
                    .and_then(|b| b.summary.clone())
                    .or_else(|| fields.and_then(|f| f.summary.clone())),
                rank: persisted,
            }
        })
        .collect();

    Shortlist {
        required_skills: job.requirements.required_skills.clone(),
        shortlist_size,
        candidates,
    }
}

/// Normalizes a raw score to a 0–100 integer. Values at or below 1.0 are
/// treated as fractions and scaled; anything above is assumed to already be
/// a percentage. The bundled scorer is contracted to 0.0–1.0, so the
/// heuristic only matters for rows written by other backends.
pub fn normalize_score(raw: f64) -> i64 {
    let pct = if raw <= 1.0 { raw * 100.0 } else { raw };
    (pct.round() as i64).clamp(0, 100)
}

/// Case-insensitive intersection of candidate skills with the job's
/// required skills, preserving the candidate's spelling.
fn matched_skills(candidate: &[String], required: &[String]) -> Vec<String> {
    candidate
        .iter()
        .filter(|skill| {
            required
                .iter()
                .any(|req| req.eq_ignore_ascii_case(skill.as_str()))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobRequirements;
    use crate::models::resume::{ResumeStatus, ScoreBreakdown};
    use chrono::{Duration, Utc};
    use sqlx::types::Json;

    fn job_with(top_candidates: Option<i64>, required_skills: &[&str]) -> JobPostingRow {
        let now = Utc::now();
        JobPostingRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            title: "Backend Engineer".to_string(),
            requirements: Json(JobRequirements {
                required_skills: required_skills.iter().map(|s| s.to_string()).collect(),
                top_candidates,
            }),
            sorting_state: SortingState::Completed,
            sorted_count: 0,
            analyzed_count: 0,
            last_activity_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn scored_resume(score: f64, completed_secs_ago: i64, rank: Option<i64>) -> ResumeRow {
        let now = Utc::now();
        ResumeRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            status: ResumeStatus::Completed,
            error_message: None,
            overall_score: Some(score),
            score_breakdown: Some(Json(ScoreBreakdown {
                skills: vec!["Rust".to_string(), "Go".to_string()],
                summary: Some("fits well".to_string()),
                experience_years: Some(6.0),
                rank,
            })),
            extracted_fields: None,
            extracted_text: Some("resume text".to_string()),
            source_key: "resumes/doc.pdf".to_string(),
            created_at: now - Duration::hours(2),
            updated_at: now - Duration::seconds(completed_secs_ago),
            ocr_started_at: Some(now - Duration::minutes(10)),
            processed_at: Some(now - Duration::seconds(completed_secs_ago)),
        }
    }

    #[test]
    fn fraction_and_percentage_scores_normalize_identically() {
        assert_eq!(normalize_score(0.82), 82);
        assert_eq!(normalize_score(82.0), 82);
    }

    #[test]
    fn normalize_score_stays_in_bounds() {
        assert_eq!(normalize_score(0.0), 0);
        assert_eq!(normalize_score(1.0), 100);
        assert_eq!(normalize_score(100.0), 100);
        assert_eq!(normalize_score(250.0), 100);
        assert_eq!(normalize_score(-0.5), 0);
    }

    #[test]
    fn cutoff_boundary_splits_shortlist_and_hold() {
        let job = job_with(Some(2), &[]);
        let rows = vec![
            scored_resume(0.90, 10, Some(1)),
            scored_resume(0.85, 20, Some(2)),
            scored_resume(0.75, 30, Some(3)),
        ];

        let shortlist = build_shortlist(&job, rows);
        assert_eq!(shortlist.shortlist_size, 2);
        assert_eq!(shortlist.candidates[0].stage, Stage::Shortlist);
        assert_eq!(shortlist.candidates[1].stage, Stage::Shortlist);
        assert_eq!(shortlist.candidates[2].stage, Stage::Hold);
    }

    #[test]
    fn cutoff_covering_everyone_shortlists_all() {
        let job = job_with(Some(3), &[]);
        let rows = vec![
            scored_resume(0.90, 10, Some(1)),
            scored_resume(0.85, 20, Some(2)),
            scored_resume(0.75, 30, Some(3)),
        ];

        let shortlist = build_shortlist(&job, rows);
        assert!(shortlist
            .candidates
            .iter()
            .all(|c| c.stage == Stage::Shortlist));
    }

    #[test]
    fn missing_target_defaults_to_everyone() {
        let job = job_with(None, &[]);
        let rows = vec![scored_resume(0.90, 10, None), scored_resume(0.40, 20, None)];

        let shortlist = build_shortlist(&job, rows);
        assert_eq!(shortlist.shortlist_size, 2);
        assert!(shortlist
            .candidates
            .iter()
            .all(|c| c.stage == Stage::Shortlist));
    }

    #[test]
    fn position_stands_in_when_no_rank_was_persisted() {
        let job = job_with(Some(1), &[]);
        let rows = vec![scored_resume(0.60, 20, None), scored_resume(0.95, 10, None)];

        let shortlist = build_shortlist(&job, rows);
        // Highest score lands first despite input order, and takes the only
        // shortlist slot.
        assert_eq!(shortlist.candidates[0].match_score, 95);
        assert_eq!(shortlist.candidates[0].stage, Stage::Shortlist);
        assert_eq!(shortlist.candidates[1].stage, Stage::Hold);
        assert!(shortlist.candidates[0].rank.is_none());
    }

    #[test]
    fn matched_skills_intersect_case_insensitively() {
        let job = job_with(None, &["rust", "SQL"]);
        let rows = vec![scored_resume(0.80, 10, Some(1))];

        let shortlist = build_shortlist(&job, rows);
        // Candidate lists "Rust" and "Go"; only Rust is required.
        assert_eq!(shortlist.candidates[0].matched_skills, vec!["Rust"]);
    }

    #[test]
    fn unnamed_candidates_get_positional_placeholder() {
        let job = job_with(None, &[]);
        let rows = vec![scored_resume(0.80, 10, Some(1))];

        let shortlist = build_shortlist(&job, rows);
        assert_eq!(shortlist.candidates[0].name, "Candidate 1");
    }
}
