//! Prompt templates for the resume scoring call.
//!
//! Placeholders: `{source_key}` (object-storage key of the uploaded
//! document), `{required_skills}` (comma-separated list from the job
//! posting).

pub const SCORE_SYSTEM: &str = r#"You are a hiring-pipeline document analyst. You extract structured candidate data from resume documents and score them against job requirements. You always respond with a single valid JSON object and nothing else."#;

pub const SCORE_PROMPT: &str = r#"Analyze the resume stored at key "{source_key}" against a role requiring these skills: {required_skills}.

Return exactly this JSON shape:
{
  "extracted_fields": {
    "name": "candidate full name or null",
    "email": "email or null",
    "skills": ["skill", ...],
    "summary": "one-sentence candidate summary or null",
    "experience_years": 0.0
  },
  "extracted_text": "plain text of the document",
  "overall_score": 0.0,
  "score_breakdown": {
    "skills": ["matched skill", ...],
    "summary": "one-sentence fit rationale or null",
    "experience_years": 0.0
  }
}

overall_score MUST be a fraction between 0.0 and 1.0."#;
