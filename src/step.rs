use crate::core::{
    BatchError, Bindable, ParameterSource, RawTuple, RawTupleStream, Result, Source, Transform,
};
use crate::mapper::FieldMapper;
use crate::writer::ChunkedWriter;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Ready,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Ready => "READY",
            StepStatus::Running => "RUNNING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// What to do with a line whose field count is wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Abort the step on the first malformed line.
    #[default]
    Fail,
    /// Log and drop up to `limit` malformed lines, then fail.
    Skip { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_name: String,
    pub status: StepStatus,
    pub read_count: usize,
    pub write_count: usize,
    pub skip_count: usize,
    pub commit_count: usize,
    pub rollback_count: usize,
}

impl StepExecution {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Ready,
            read_count: 0,
            write_count: 0,
            skip_count: 0,
            commit_count: 0,
            rollback_count: 0,
        }
    }
}

#[async_trait]
pub trait Step: Send {
    fn name(&self) -> &str;

    /// Runs the step from the start of its input.
    async fn execute(&mut self) -> Result<StepExecution>;

    /// State of the latest execution, including a failed one.
    fn execution(&self) -> &StepExecution;
}

/// Read-map-transform-write step committing once per chunk.
pub struct ChunkStep<I: Bindable, O> {
    name: String,
    chunk_size: usize,
    source: Box<dyn Source>,
    mapper: FieldMapper<I>,
    transform: Box<dyn Transform<I, O>>,
    writer: ChunkedWriter<O>,
    policy: MalformedPolicy,
    execution: StepExecution,
}

impl<I, O> ChunkStep<I, O>
where
    I: Bindable,
    O: ParameterSource + 'static,
{
    pub fn new(
        name: impl Into<String>,
        chunk_size: usize,
        source: Box<dyn Source>,
        mapper: FieldMapper<I>,
        transform: Box<dyn Transform<I, O>>,
        writer: ChunkedWriter<O>,
    ) -> Result<Self> {
        let name = name.into();
        if chunk_size == 0 {
            return Err(BatchError::Config(format!(
                "Step '{}' needs a chunk size of at least 1",
                name
            )));
        }

        Ok(Self {
            execution: StepExecution::new(&name),
            name,
            chunk_size,
            source,
            mapper,
            transform,
            writer,
            policy: MalformedPolicy::default(),
        })
    }

    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn run(&mut self) -> Result<()> {
        let mut stream = self.source.open().await?;
        let result = self.drain(&mut stream).await;
        drop(stream);
        let closed = self.source.close().await;
        result.and(closed)
    }

    async fn drain(&mut self, stream: &mut RawTupleStream) -> Result<()> {
        let mut chunk: Vec<O> = Vec::with_capacity(self.chunk_size);
        let mut exhausted = false;

        while !exhausted {
            while chunk.len() < self.chunk_size {
                match stream.next().await {
                    Some(item) => {
                        if let Some(out) = self.process(item).await? {
                            chunk.push(out);
                        }
                    }
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            if !chunk.is_empty() {
                self.flush(&chunk).await?;
                chunk.clear();
            }
        }

        Ok(())
    }

    async fn process(&mut self, item: Result<RawTuple>) -> Result<Option<O>> {
        let tuple = match item {
            Ok(tuple) => tuple,
            Err(e) if e.is_malformed() => return self.skip_or_fail(e),
            Err(e) => return Err(e),
        };
        self.execution.read_count += 1;

        let record = self.mapper.map(tuple)?;
        let out = self.transform.transform(&record).await?;
        Ok(Some(out))
    }

    fn skip_or_fail(&mut self, e: BatchError) -> Result<Option<O>> {
        match self.policy {
            MalformedPolicy::Skip { limit } if self.execution.skip_count < limit => {
                self.execution.skip_count += 1;
                warn!(step = %self.name, error = %e, "Skipping malformed line");
                Ok(None)
            }
            _ => Err(e),
        }
    }

    async fn flush(&mut self, chunk: &[O]) -> Result<()> {
        self.writer.begin().await?;

        let outcome = match self.writer.write(chunk).await {
            Ok(_) => self.writer.commit().await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            if let Err(rollback) = self.writer.rollback().await {
                warn!(step = %self.name, error = %rollback, "Rollback failed");
            }
            self.execution.rollback_count += 1;
            return Err(e);
        }

        self.execution.write_count += chunk.len();
        self.execution.commit_count += 1;
        debug!(
            step = %self.name,
            chunk = self.execution.commit_count,
            items = chunk.len(),
            "Chunk committed"
        );
        Ok(())
    }
}

#[async_trait]
impl<I, O> Step for ChunkStep<I, O>
where
    I: Bindable,
    O: ParameterSource + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self) -> Result<StepExecution> {
        self.execution = StepExecution::new(&self.name);
        self.execution.status = StepStatus::Running;
        info!(step = %self.name, chunk_size = self.chunk_size, "Step started");

        match self.run().await {
            Ok(()) => {
                self.execution.status = StepStatus::Completed;
                info!(
                    step = %self.name,
                    read = self.execution.read_count,
                    written = self.execution.write_count,
                    skipped = self.execution.skip_count,
                    commits = self.execution.commit_count,
                    "Step completed"
                );
                Ok(self.execution.clone())
            }
            Err(e) => {
                self.execution.status = StepStatus::Failed;
                error!(step = %self.name, error = %e, "Step failed");
                Err(e)
            }
        }
    }

    fn execution(&self) -> &StepExecution {
        &self.execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldBindingSpec, RowReader};
    use crate::people::Person;
    use crate::sink::MemoryDatabase;
    use crate::source::{DelimitedSource, Resource};
    use crate::transform::UppercaseTransform;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    const SQL: &str = "INSERT INTO people (first_name, last_name) VALUES (:firstName, :lastName)";

    fn step(input: &str, chunk_size: usize, db: &MemoryDatabase) -> ChunkStep<Person, Person> {
        let spec = FieldBindingSpec::default();
        ChunkStep::new(
            "step1",
            chunk_size,
            Box::new(DelimitedSource::new(Resource::inline(input), &spec)),
            FieldMapper::new(&spec).unwrap(),
            Box::new(UppercaseTransform::<Person>::new()),
            ChunkedWriter::new(SQL, Box::new(db.sink())).unwrap(),
        )
        .unwrap()
    }

    fn lines(n: usize) -> String {
        (0..n).map(|i| format!("first{},last{}\n", i, i)).collect()
    }

    async fn people(db: &MemoryDatabase) -> Vec<Vec<String>> {
        db.read_rows("people", &["first_name".to_string(), "last_name".to_string()])
            .await
            .unwrap()
    }

    struct Reject;

    #[async_trait]
    impl Transform<Person, Person> for Reject {
        async fn transform(&self, item: &Person) -> Result<Person> {
            if item.last_name == "Bad" {
                return Err(BatchError::Transform(format!("Refusing {}", item)));
            }
            Ok(item.clone())
        }
    }

    #[tokio::test]
    async fn writer_called_once_per_chunk() {
        for (n, c, expected) in [
            (0usize, 3usize, Vec::<usize>::new()),
            (1, 3, vec![1]),
            (3, 3, vec![3]),
            (7, 3, vec![3, 3, 1]),
            (9, 3, vec![3, 3, 3]),
            (2, 10, vec![2]),
        ] {
            let db = MemoryDatabase::new();
            let execution = step(&lines(n), c, &db).execute().await.unwrap();

            assert_eq!(db.batch_sizes().await, expected, "n={} c={}", n, c);
            assert_eq!(execution.commit_count, expected.len());
            assert_eq!(execution.read_count, n);
            assert_eq!(execution.write_count, n);
            assert_eq!(execution.status, StepStatus::Completed);
        }
    }

    #[tokio::test]
    async fn writes_in_read_order_uppercased() {
        let db = MemoryDatabase::new();
        step("Jane,Doe\nJohn,Smith\n", 10, &db).execute().await.unwrap();

        assert_eq!(people(&db).await, vec![vec!["JANE", "DOE"], vec!["JOHN", "SMITH"]]);
    }

    #[tokio::test]
    async fn malformed_line_fails_before_its_chunk_is_written() {
        let db = MemoryDatabase::new();
        let mut step = step("a,b\nc,d\ne,f\ng,h,i\n", 2, &db);

        let err = step.execute().await.unwrap_err();
        assert!(matches!(err, BatchError::MalformedRecord { line: 4, .. }));

        // First chunk committed, the chunk holding line 4 never flushed.
        assert_eq!(db.batch_sizes().await, vec![2]);
        assert_eq!(people(&db).await.len(), 2);
        assert_eq!(step.execution().status, StepStatus::Failed);
        assert_eq!(step.execution().commit_count, 1);
    }

    #[tokio::test]
    async fn skip_policy_drops_malformed_lines_up_to_limit() {
        let db = MemoryDatabase::new();
        let execution = step("a,b\nbad\nc,d\n", 10, &db)
            .with_malformed_policy(MalformedPolicy::Skip { limit: 1 })
            .execute()
            .await
            .unwrap();

        assert_eq!(execution.skip_count, 1);
        assert_eq!(execution.write_count, 2);

        let db = MemoryDatabase::new();
        let result = step("bad\nworse\nc,d\n", 10, &db)
            .with_malformed_policy(MalformedPolicy::Skip { limit: 1 })
            .execute()
            .await;
        assert!(matches!(result, Err(BatchError::MalformedRecord { line: 2, .. })));
        assert!(db.batch_sizes().await.is_empty());
    }

    #[tokio::test]
    async fn write_error_rolls_back_the_chunk() {
        let db = MemoryDatabase::new().with_column_limit(5);
        let mut step = step("ann,lee\nbo,li\nmaximilian,x\n", 2, &db);

        let err = step.execute().await.unwrap_err();
        assert!(matches!(err, BatchError::Write(_)));
        assert_eq!(people(&db).await, vec![vec!["ANN", "LEE"], vec!["BO", "LI"]]);
        assert_eq!(step.execution().rollback_count, 1);
    }

    #[tokio::test]
    async fn transform_error_aborts_the_step() {
        let db = MemoryDatabase::new();
        let spec = FieldBindingSpec::default();
        let mut step = ChunkStep::new(
            "step1",
            10,
            Box::new(DelimitedSource::new(Resource::inline("Jane,Doe\nJoe,Bad\n"), &spec)),
            FieldMapper::new(&spec).unwrap(),
            Box::new(Reject),
            ChunkedWriter::new(SQL, Box::new(db.sink())).unwrap(),
        )
        .unwrap();

        let err = step.execute().await.unwrap_err();
        assert!(matches!(err, BatchError::Transform(_)));
        assert!(db.batch_sizes().await.is_empty());
    }

    struct StreamGuard(Arc<AtomicBool>);

    impl Drop for StreamGuard {
        fn drop(&mut self) {
            self.0.store(false, Ordering::SeqCst);
        }
    }

    /// Records whether its stream was still alive when `close` ran.
    #[derive(Default)]
    struct TrackedSource {
        streaming: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
        streaming_at_close: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Source for TrackedSource {
        async fn open(&self) -> Result<RawTupleStream> {
            self.streaming.store(true, Ordering::SeqCst);
            let guard = StreamGuard(self.streaming.clone());
            let tuples = vec![Ok(RawTuple::new(1, vec!["Jane".to_string(), "Doe".to_string()]))];
            Ok(Box::pin(futures::stream::iter(tuples).map(move |item| {
                let _alive = &guard;
                item
            })))
        }

        async fn close(&self) -> Result<()> {
            self.streaming_at_close
                .store(self.streaming.load(Ordering::SeqCst), Ordering::SeqCst);
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stream_is_released_before_the_source_closes() {
        let db = MemoryDatabase::new();
        let spec = FieldBindingSpec::default();
        let source = TrackedSource::default();
        let closed = source.closed.clone();
        let streaming_at_close = source.streaming_at_close.clone();
        let mut step = ChunkStep::<Person, Person>::new(
            "step1",
            10,
            Box::new(source),
            FieldMapper::new(&spec).unwrap(),
            Box::new(UppercaseTransform::<Person>::new()),
            ChunkedWriter::new(SQL, Box::new(db.sink())).unwrap(),
        )
        .unwrap();

        step.execute().await.unwrap();

        assert!(closed.load(Ordering::SeqCst));
        assert!(!streaming_at_close.load(Ordering::SeqCst));
        assert_eq!(people(&db).await, vec![vec!["JANE", "DOE"]]);
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected() {
        let db = MemoryDatabase::new();
        let spec = FieldBindingSpec::default();
        let result = ChunkStep::<Person, Person>::new(
            "step1",
            0,
            Box::new(DelimitedSource::new(Resource::inline(""), &spec)),
            FieldMapper::new(&spec).unwrap(),
            Box::new(UppercaseTransform::<Person>::new()),
            ChunkedWriter::new(SQL, Box::new(db.sink())).unwrap(),
        );
        assert!(matches!(result, Err(BatchError::Config(_))));
    }

    #[tokio::test]
    async fn executing_again_rereads_from_the_start() {
        let db = MemoryDatabase::new();
        let mut step = step("Jane,Doe\n", 10, &db);

        step.execute().await.unwrap();
        let second = step.execute().await.unwrap();

        assert_eq!(second.read_count, 1);
        assert_eq!(db.batch_sizes().await, vec![1, 1]);
    }
}
