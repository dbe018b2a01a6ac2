use crate::job::{JobRun, JobStatus};
use async_trait::async_trait;
use tracing::{error, info};

/// Hooks around a job run. Each is called exactly once per run; `after_job`
/// sees the terminal status.
#[async_trait]
pub trait JobListener: Send + Sync {
    async fn before_job(&self, _run: &JobRun) {}

    async fn after_job(&self, _run: &JobRun) {}
}

pub struct LoggingListener;

#[async_trait]
impl JobListener for LoggingListener {
    async fn before_job(&self, run: &JobRun) {
        info!(run_id = run.run_id, job = %run.job_name, "Launching job");
    }

    async fn after_job(&self, run: &JobRun) {
        let written: usize = run.steps.iter().map(|s| s.write_count).sum();
        match run.status {
            JobStatus::Failed => error!(
                run_id = run.run_id,
                job = %run.job_name,
                error = run.exit_description.as_deref().unwrap_or("unknown"),
                "Job run failed"
            ),
            status => info!(
                run_id = run.run_id,
                job = %run.job_name,
                %status,
                written,
                "Job run finished"
            ),
        }
    }
}

/// Reports every row read back from the target table once a run completes.
pub struct CompletionNotificationListener;

#[async_trait]
impl JobListener for CompletionNotificationListener {
    async fn after_job(&self, run: &JobRun) {
        if run.status != JobStatus::Completed {
            return;
        }

        info!(run_id = run.run_id, "Job finished, verifying results");
        for row in &run.read_back {
            info!(run_id = run.run_id, "Found <{}> in the database", row.join(", "));
        }
    }
}
