use crate::core::{BatchError, Result, Row, RowReader};
use crate::listener::JobListener;
use crate::repository::JobRepository;
use crate::step::{Step, StepExecution};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Started,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Started)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Started => "STARTED",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One execution of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub run_id: u64,
    pub job_name: String,
    pub status: JobStatus,
    pub steps: Vec<StepExecution>,
    pub exit_description: Option<String>,
    /// Rows read back from the target table after a successful run.
    pub read_back: Vec<Row>,
    #[serde(skip)]
    pub failure: Option<Arc<BatchError>>,
}

impl JobRun {
    fn started(run_id: u64, job_name: &str) -> Self {
        Self {
            run_id,
            job_name: job_name.to_string(),
            status: JobStatus::Started,
            steps: Vec::new(),
            exit_description: None,
            read_back: Vec::new(),
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }

    fn complete(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Started);
        self.status = JobStatus::Completed;
    }

    fn fail(&mut self, error: BatchError) {
        debug_assert_eq!(self.status, JobStatus::Started);
        self.status = JobStatus::Failed;
        self.exit_description = Some(error.to_string());
        self.failure = Some(Arc::new(error));
    }
}

struct ReadBack {
    reader: Box<dyn RowReader>,
    table: String,
    columns: Vec<String>,
}

/// Steps run in order; the first failing step ends the run.
pub struct Job {
    name: String,
    steps: Vec<Box<dyn Step>>,
    listeners: Vec<Box<dyn JobListener>>,
    read_back: Option<ReadBack>,
}

impl Job {
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder {
            name: name.into(),
            steps: Vec::new(),
            listeners: Vec::new(),
            read_back: None,
        }
    }

    pub fn add_listener(&mut self, listener: impl JobListener + 'static) {
        self.listeners.push(Box::new(listener));
    }
}

pub struct JobBuilder {
    name: String,
    steps: Vec<Box<dyn Step>>,
    listeners: Vec<Box<dyn JobListener>>,
    read_back: Option<ReadBack>,
}

impl JobBuilder {
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn listener(mut self, listener: impl JobListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Rows of `table` to hand to listeners once the run completes.
    pub fn read_back(
        mut self,
        reader: Box<dyn RowReader>,
        table: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        self.read_back = Some(ReadBack {
            reader,
            table: table.into(),
            columns,
        });
        self
    }

    pub fn build(self) -> Result<Job> {
        if self.steps.is_empty() {
            return Err(BatchError::Config(format!(
                "Job '{}' has no steps",
                self.name
            )));
        }

        Ok(Job {
            name: self.name,
            steps: self.steps,
            listeners: self.listeners,
            read_back: self.read_back,
        })
    }
}

pub struct JobLauncher {
    repository: Arc<dyn JobRepository>,
}

impl JobLauncher {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self { repository }
    }

    /// Runs the job under a fresh run id. Listeners hear `before_job` and
    /// `after_job` exactly once each; failures end up in the returned run.
    pub async fn launch(&self, job: &mut Job) -> JobRun {
        let run_id = self.repository.next_run_id(&job.name).await;
        let mut run = JobRun::started(run_id, &job.name);
        self.repository.update(&run).await;

        info!(run_id, job = %job.name, "Job started");
        for listener in &job.listeners {
            listener.before_job(&run).await;
        }

        for step in job.steps.iter_mut() {
            match step.execute().await {
                Ok(execution) => run.steps.push(execution),
                Err(e) => {
                    run.steps.push(step.execution().clone());
                    error!(run_id, job = %job.name, step = step.name(), error = %e, "Job failed");
                    run.fail(e);
                    break;
                }
            }
        }

        if !run.status.is_terminal() {
            run.complete();
            if let Some(read_back) = &job.read_back {
                match read_back
                    .reader
                    .read_rows(&read_back.table, &read_back.columns)
                    .await
                {
                    Ok(rows) => run.read_back = rows,
                    Err(e) => warn!(run_id, error = %e, "Could not read back written rows"),
                }
            }
            info!(run_id, job = %job.name, "Job completed");
        }

        self.repository.update(&run).await;
        for listener in &job.listeners {
            listener.after_job(&run).await;
        }

        run
    }
}
