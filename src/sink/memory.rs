use crate::core::{BatchError, BatchInsert, Result, Row, RowReader, Sink};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type StoredRow = HashMap<String, String>;

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<StoredRow>>,
    batch_sizes: Vec<usize>,
}

/// In-process table store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    column_limit: Option<usize>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects any batch holding a value longer than `limit` characters.
    pub fn with_column_limit(mut self, limit: usize) -> Self {
        self.column_limit = Some(limit);
        self
    }

    pub fn sink(&self) -> MemorySink {
        MemorySink {
            db: self.clone(),
            staged: Vec::new(),
            in_transaction: false,
        }
    }

    /// Size of every batch handed to a sink, accepted or not.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.tables.lock().await.batch_sizes.clone()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .await
            .rows
            .get(table)
            .map_or(0, |rows| rows.len())
    }

    fn check(&self, batch: &BatchInsert) -> Result<Vec<(String, StoredRow)>> {
        let mut staged = Vec::with_capacity(batch.rows.len());
        for (index, row) in batch.rows.iter().enumerate() {
            if row.len() != batch.columns.len() {
                return Err(BatchError::Write(format!(
                    "Row {} of batch has {} values for {} columns",
                    index,
                    row.len(),
                    batch.columns.len()
                )));
            }

            let mut stored = StoredRow::new();
            for (column, value) in batch.columns.iter().zip(row) {
                if let Some(limit) = self.column_limit {
                    if value.chars().count() > limit {
                        return Err(BatchError::Write(format!(
                            "Value too long for column {}.{} (limit {}): '{}'",
                            batch.table, column, limit, value
                        )));
                    }
                }
                stored.insert(column.clone(), value.clone());
            }
            staged.push((batch.table.clone(), stored));
        }
        Ok(staged)
    }
}

#[async_trait]
impl RowReader for MemoryDatabase {
    async fn read_rows(&self, table: &str, columns: &[String]) -> Result<Vec<Row>> {
        let tables = self.tables.lock().await;
        let rows = tables.rows.get(table).map(Vec::as_slice).unwrap_or_default();

        Ok(rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| row.get(column).cloned().unwrap_or_default())
                    .collect()
            })
            .collect())
    }
}

/// Sink over a [`MemoryDatabase`]. Batches executed inside a transaction
/// are staged until `commit`.
#[derive(Debug)]
pub struct MemorySink {
    db: MemoryDatabase,
    staged: Vec<(String, StoredRow)>,
    in_transaction: bool,
}

impl MemorySink {
    async fn apply(&self, rows: Vec<(String, StoredRow)>) {
        let mut tables = self.db.tables.lock().await;
        for (table, row) in rows {
            tables.rows.entry(table).or_default().push(row);
        }
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn begin(&mut self) -> Result<()> {
        self.staged.clear();
        self.in_transaction = true;
        Ok(())
    }

    async fn execute_batch(&mut self, batch: &BatchInsert) -> Result<u64> {
        self.db.tables.lock().await.batch_sizes.push(batch.len());

        let rows = self.db.check(batch)?;
        let count = rows.len() as u64;
        if self.in_transaction {
            self.staged.extend(rows);
        } else {
            self.apply(rows).await;
        }
        Ok(count)
    }

    async fn commit(&mut self) -> Result<()> {
        let rows = std::mem::take(&mut self.staged);
        self.apply(rows).await;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        self.in_transaction = false;
        Ok(())
    }
}
