use crate::core::{BatchError, FieldBindingSpec, InsertStatement, Result};
use crate::step::MalformedPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to wire and launch an import job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub job_name: String,
    pub step_name: String,
    pub input: PathBuf,
    pub delimiter: char,
    pub field_names: Vec<String>,
    pub lines_to_skip: usize,
    pub comment_prefixes: Vec<String>,
    /// Drop blank lines instead of treating them as malformed.
    pub skip_blank_lines: bool,
    pub chunk_size: usize,
    pub insert_sql: String,
    pub database_url: String,
    /// Script run before the job; the built-in `people` schema when unset.
    pub schema: Option<PathBuf>,
    pub malformed_policy: MalformedPolicy,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            job_name: "importUserJob".to_string(),
            step_name: "step1".to_string(),
            input: PathBuf::from("data/sample-data.csv"),
            delimiter: ',',
            field_names: FieldBindingSpec::default().names().to_vec(),
            lines_to_skip: 0,
            comment_prefixes: vec!["#".to_string()],
            skip_blank_lines: false,
            chunk_size: 10,
            insert_sql: "INSERT INTO people (first_name, last_name) VALUES (:firstName, :lastName)"
                .to_string(),
            database_url: "sqlite::memory:".to_string(),
            schema: None,
            malformed_policy: MalformedPolicy::Fail,
        }
    }
}

impl JobConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: JobConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(BatchError::Config("chunk_size must be at least 1".to_string()));
        }
        if !self.delimiter.is_ascii() {
            return Err(BatchError::Config(format!(
                "Delimiter '{}' is not a single-byte character",
                self.delimiter
            )));
        }
        if matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(BatchError::Config(format!(
                "Delimiter {:?} collides with quoting or line endings",
                self.delimiter
            )));
        }
        self.binding_spec()?;
        InsertStatement::parse(&self.insert_sql)?;
        Ok(())
    }

    pub fn binding_spec(&self) -> Result<FieldBindingSpec> {
        FieldBindingSpec::new(self.field_names.iter().cloned())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }
}
