mod service;
mod stuck;

pub use service::{DlqService, ResolveResult, dlq_service};
pub use stuck::{flag_stuck_jobs, run_stuck_job_detector};
