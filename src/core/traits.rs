use crate::core::{BatchInsert, RawTuple, Result};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub type RawTupleStream = Pin<Box<dyn Stream<Item = Result<RawTuple>> + Send>>;

pub type Row = Vec<String>;

#[async_trait]
pub trait Source: Send + Sync {
    /// Starts a fresh pass over the input from its first line.
    async fn open(&self) -> Result<RawTupleStream>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Transform<I, O>: Send + Sync
where
    I: Send + Sync,
{
    async fn transform(&self, item: &I) -> Result<O>;
}

/// Destination for batched inserts. All batches executed between `begin`
/// and `commit` become durable together; `rollback` discards them.
#[async_trait]
pub trait Sink: Send {
    async fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Executes every row of the batch or none of them.
    async fn execute_batch(&mut self, batch: &BatchInsert) -> Result<u64>;

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait RowReader: Send + Sync {
    async fn read_rows(&self, table: &str, columns: &[String]) -> Result<Vec<Row>>;
}
