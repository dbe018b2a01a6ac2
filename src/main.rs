use anyhow::{Context, Result};
use clap::Parser;
use dbatch::people::import_people_job;
use dbatch::repository::InMemoryJobRepository;
use dbatch::sink::SqliteDatabase;
use dbatch::sink::sqlite::PEOPLE_SCHEMA;
use dbatch::{JobConfig, JobLauncher, MalformedPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Load delimited person records into a SQL table in fixed-size chunks.
#[derive(Debug, Parser)]
#[command(name = "dbatch", version)]
struct Cli {
    /// TOML job configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input file, overrides the configuration
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    delimiter: Option<char>,

    #[arg(long)]
    database_url: Option<String>,

    /// Skip up to this many malformed lines instead of failing
    #[arg(long, value_name = "LIMIT")]
    skip_malformed: Option<usize>,

    /// Print the finished run as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply(&self, config: &mut JobConfig) {
        if let Some(input) = &self.input {
            config.input = input.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(delimiter) = self.delimiter {
            config.delimiter = delimiter;
        }
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(limit) = self.skip_malformed {
            config.malformed_policy = MalformedPolicy::Skip { limit };
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => JobConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => JobConfig::default(),
    };
    cli.apply(&mut config);
    config.validate().context("Invalid job configuration")?;

    let db = SqliteDatabase::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let schema = match &config.schema {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema {}", path.display()))?,
        None => PEOPLE_SCHEMA.to_string(),
    };
    db.execute_script(&schema)
        .await
        .context("Failed to prepare schema")?;

    let mut job = import_people_job(&config, Box::new(db.sink()), Box::new(db.clone()))?;
    let launcher = JobLauncher::new(Arc::new(InMemoryJobRepository::new()));
    let run = launcher.launch(&mut job).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    }

    match &run.failure {
        Some(e) => anyhow::bail!("Job run {} failed: {}", run.run_id, e),
        None => Ok(()),
    }
}
