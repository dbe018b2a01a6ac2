use crate::core::{BatchError, BatchInsert, Result, Row, RowReader, Sink, is_identifier};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, QueryBuilder, Row as _, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Drops and recreates the `people` table.
pub const PEOPLE_SCHEMA: &str = include_str!("../../sql/schema.sql");

/// SQLite's default cap on bound parameters per statement.
pub const SQLITE_MAX_BINDS: usize = 32766;

/// Handle on a SQLite database. Clones share the pool.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Connects with a single pooled connection so `sqlite::memory:` keeps
    /// one database for the life of the handle.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        info!(url, "Connected to SQLite");
        Ok(Self { pool })
    }

    pub async fn execute_script(&self, script: &str) -> Result<()> {
        sqlx::raw_sql(script).execute(&self.pool).await?;
        Ok(())
    }

    pub fn sink(&self) -> SqliteSink {
        SqliteSink {
            pool: self.pool.clone(),
            tx: None,
            max_binds: SQLITE_MAX_BINDS,
        }
    }
}

#[async_trait]
impl RowReader for SqliteDatabase {
    async fn read_rows(&self, table: &str, columns: &[String]) -> Result<Vec<Row>> {
        if let Some(bad) = std::iter::once(table)
            .chain(columns.iter().map(String::as_str))
            .find(|name| !is_identifier(name))
        {
            return Err(BatchError::Config(format!("Invalid identifier '{}'", bad)));
        }

        let sql = format!("SELECT {} FROM {} ORDER BY rowid", columns.join(", "), table);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let values = rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row.try_get::<Option<String>, _>(i).map(Option::unwrap_or_default))
                    .collect::<std::result::Result<Row, sqlx::Error>>()
            })
            .collect::<std::result::Result<Vec<Row>, sqlx::Error>>()?;

        Ok(values)
    }
}

/// Sink that runs each chunk inside one SQLite transaction.
pub struct SqliteSink {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    max_binds: usize,
}

impl SqliteSink {
    /// Caps bound parameters per statement; larger batches are split.
    pub fn with_max_binds(mut self, max_binds: usize) -> Self {
        self.max_binds = max_binds.max(1);
        self
    }
}

/// Multi-row `INSERT ... VALUES (..), (..)`, split so no statement binds
/// more than `max_binds` parameters.
async fn insert_rows(
    conn: &mut SqliteConnection,
    batch: &BatchInsert,
    max_binds: usize,
) -> Result<u64> {
    if batch.rows.is_empty() {
        return Ok(0);
    }
    if let Some(bad) = std::iter::once(batch.table.as_str())
        .chain(batch.columns.iter().map(String::as_str))
        .find(|name| !is_identifier(name))
    {
        return Err(BatchError::Write(format!("Invalid identifier '{}'", bad)));
    }

    let rows_per_statement = (max_binds / batch.columns.len().max(1)).max(1);
    let mut affected = 0;
    for rows in batch.rows.chunks(rows_per_statement) {
        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            batch.table,
            batch.columns.join(", ")
        ));
        query_builder.push_values(rows, |mut b, row| {
            for value in row {
                b.push_bind(value.as_str());
            }
        });

        let done = query_builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                BatchError::Write(format!("Batch insert into {} rejected: {}", batch.table, e))
            })?;
        affected += done.rows_affected();
    }
    Ok(affected)
}

#[async_trait]
impl Sink for SqliteSink {
    async fn begin(&mut self) -> Result<()> {
        if let Some(stale) = self.tx.take() {
            stale.rollback().await?;
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn execute_batch(&mut self, batch: &BatchInsert) -> Result<u64> {
        // Savepoint inside a chunk transaction, a transaction of its own otherwise.
        let mut tx = match self.tx.as_mut() {
            Some(outer) => Connection::begin(&mut **outer).await?,
            None => self.pool.begin().await?,
        };

        match insert_rows(&mut tx, batch, self.max_binds).await {
            Ok(affected) => {
                tx.commit().await?;
                debug!(table = %batch.table, rows = affected, "Executed batch insert");
                Ok(affected)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
