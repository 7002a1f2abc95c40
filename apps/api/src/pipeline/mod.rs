//! The resume processing and ranking pipeline.
//!
//! Request path: `dispatcher` fans a job's eligible resumes out to the queue,
//! `ranking` accepts ranking passes. Worker path: `worker` drains both queues
//! and writes terminal state back through the store. Read path: `status`
//! assembles progress and the shortlist. Handlers are thin axum glue.

pub mod dispatcher;
pub mod handlers;
pub mod ranking;
pub mod status;
pub mod worker;
