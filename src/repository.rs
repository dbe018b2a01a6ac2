use crate::job::JobRun;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Where run ids come from and where run status is reported.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Returns an id greater than every id handed out before.
    async fn next_run_id(&self, job_name: &str) -> u64;

    async fn update(&self, run: &JobRun);
}

#[derive(Default)]
struct History {
    last_run_id: u64,
    runs: BTreeMap<u64, JobRun>,
}

/// Keeps run history for the life of the process.
#[derive(Default)]
pub struct InMemoryJobRepository {
    history: Mutex<History>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded run, oldest first.
    pub async fn runs(&self) -> Vec<JobRun> {
        self.history.lock().await.runs.values().cloned().collect()
    }

    pub async fn last_run(&self, job_name: &str) -> Option<JobRun> {
        self.history
            .lock()
            .await
            .runs
            .values()
            .rev()
            .find(|run| run.job_name == job_name)
            .cloned()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn next_run_id(&self, job_name: &str) -> u64 {
        let mut history = self.history.lock().await;
        history.last_run_id += 1;
        debug!(job = job_name, run_id = history.last_run_id, "Allocated run id");
        history.last_run_id
    }

    async fn update(&self, run: &JobRun) {
        self.history
            .lock()
            .await
            .runs
            .insert(run.run_id, run.clone());
    }
}
