pub mod config;
pub mod core;
pub mod job;
pub mod listener;
pub mod mapper;
pub mod people;
pub mod repository;
pub mod sink;
pub mod source;
pub mod step;
pub mod transform;
pub mod writer;

pub use crate::config::JobConfig;
pub use crate::core::*;
pub use crate::job::{Job, JobLauncher, JobRun, JobStatus};
pub use crate::step::{ChunkStep, MalformedPolicy, Step, StepExecution, StepStatus};
