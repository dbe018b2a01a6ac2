use crate::core::{BatchError, BatchInsert, InsertStatement, ParameterSource, Result, Sink};
use std::marker::PhantomData;
use tracing::debug;

/// Turns a whole chunk into one batched insert and hands it to the sink.
pub struct ChunkedWriter<T> {
    statement: InsertStatement,
    template: String,
    sink: Box<dyn Sink>,
    _record: PhantomData<fn(&T)>,
}

impl<T: ParameterSource> ChunkedWriter<T> {
    pub fn new(sql: &str, sink: Box<dyn Sink>) -> Result<Self> {
        let statement = InsertStatement::parse(sql)?;
        let template = statement.template();
        Ok(Self {
            statement,
            template,
            sink,
            _record: PhantomData,
        })
    }

    pub fn statement(&self) -> &InsertStatement {
        &self.statement
    }

    pub fn prepare(&self, items: &[T]) -> Result<BatchInsert> {
        let rows = items
            .iter()
            .map(|item| {
                self.statement
                    .parameters
                    .iter()
                    .map(|name| {
                        item.parameter(name).ok_or_else(|| {
                            BatchError::Binding(format!("No value for parameter ':{}'", name))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchInsert {
            table: self.statement.table.clone(),
            columns: self.statement.columns.clone(),
            sql: self.template.clone(),
            rows,
        })
    }

    /// Writes every item with a single batched insert. Nothing is sent for
    /// an empty slice.
    pub async fn write(&mut self, items: &[T]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let batch = self.prepare(items)?;
        let written = self.sink.execute_batch(&batch).await?;
        debug!(table = %batch.table, items = batch.len(), "Wrote chunk");
        Ok(written)
    }

    pub async fn begin(&mut self) -> Result<()> {
        self.sink.begin().await
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.sink.commit().await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.sink.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RowReader;
    use crate::sink::MemoryDatabase;

    struct Pair(&'static str, &'static str);

    impl ParameterSource for Pair {
        fn parameter(&self, name: &str) -> Option<String> {
            match name {
                "left" => Some(self.0.to_string()),
                "right" => Some(self.1.to_string()),
                _ => None,
            }
        }
    }

    const SQL: &str = "INSERT INTO pairs (l, r) VALUES (:left, :right)";

    #[tokio::test]
    async fn one_batch_per_write_call() {
        let db = MemoryDatabase::new();
        let mut writer = ChunkedWriter::new(SQL, Box::new(db.sink())).unwrap();

        let written = writer.write(&[Pair("a", "b"), Pair("c", "d")]).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(writer.write(&[]).await.unwrap(), 0);

        assert_eq!(db.batch_sizes().await, vec![2]);
        let rows = db
            .read_rows("pairs", &["l".to_string(), "r".to_string()])
            .await
            .unwrap();
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn prepare_uses_positional_template() {
        let writer: ChunkedWriter<Pair> =
            ChunkedWriter::new(SQL, Box::new(MemoryDatabase::new().sink())).unwrap();
        let batch = writer.prepare(&[Pair("a", "b")]).unwrap();

        assert_eq!(batch.sql, "INSERT INTO pairs (l, r) VALUES (?, ?)");
        assert_eq!(batch.rows, vec![vec!["a", "b"]]);
    }

    #[tokio::test]
    async fn unknown_parameter_is_a_binding_error() {
        let db = MemoryDatabase::new();
        let mut writer = ChunkedWriter::new(
            "INSERT INTO pairs (l, x) VALUES (:left, :missing)",
            Box::new(db.sink()),
        )
        .unwrap();

        let result = writer.write(&[Pair("a", "b")]).await;
        assert!(matches!(result, Err(BatchError::Binding(_))));
        assert!(db.batch_sizes().await.is_empty());
    }
}
