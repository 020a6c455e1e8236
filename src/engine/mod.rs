//! Engine adapter (spec.md §4.2): the only component that speaks SQL text
//! to the embedded SQLite engine. Grounded on `ArborStorage`
//! (`activations/arbor/storage.rs`) and `SqliteSessionManager`
//! (`mcp_session.rs`), both of which open a `SqlitePool` from a formatted
//! connect URL and run their own migrations at construction time.

mod decode;

use crate::error::{Result, TreeError};
use crate::value::{FieldKind, Record, Value};
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Arguments, ConnectOptions, Row};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Where the SQLite file lives.
#[derive(Debug, Clone)]
pub enum Database {
    /// In-memory database with a shared cache, so additional `Engine`
    /// handles opened against the same name observe the same tree
    /// (spec.md §4.2's URI composer requirement).
    Memory { name: String },
    /// On-disk database at the given path.
    File(PathBuf),
}

impl Database {
    pub fn memory(name: impl Into<String>) -> Self {
        Database::Memory { name: name.into() }
    }

    fn connect_url(&self) -> String {
        match self {
            Database::Memory { name } => format!("sqlite:file:{name}?mode=memory&cache=shared"),
            Database::File(path) => format!("sqlite:{}?mode=rwc", path.display()),
        }
    }
}

/// Construction parameters for an `Engine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database: Database,
    /// Bounded, no-backoff retry count for SQLITE_BUSY/SQLITE_LOCKED
    /// (spec.md §7: "retried a small, bounded number of times with no
    /// backoff before surfacing; integrity errors are not retried").
    pub busy_retries: u32,
}

impl EngineConfig {
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            database: Database::memory(name),
            busy_retries: 5,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            database: Database::File(path.into()),
            busy_retries: 5,
        }
    }
}

/// Thin wrapper over a `sqlx::SqlitePool`: parameterised execute, a
/// row-dict factory, and the JSON adapt/convert step of spec.md §4.2.
pub struct Engine {
    pool: SqlitePool,
    busy_retries: u32,
}

impl Engine {
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let url = config.database.connect_url();
        let mut connect_options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| TreeError::Storage(sqlx::Error::Configuration(Box::new(e))))?
            .create_if_missing(true);
        connect_options.disable_statement_logging();

        let pool_options = match config.database {
            Database::Memory { .. } => SqlitePoolOptions::new().min_connections(1),
            Database::File(_) => SqlitePoolOptions::new(),
        };
        let pool = pool_options.connect_with(connect_options).await?;

        Ok(Self {
            pool,
            busy_retries: config.busy_retries,
        })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn bind(values: &[Value]) -> Result<SqliteArguments<'static>> {
        let mut args = SqliteArguments::default();
        for value in values {
            match value {
                Value::Null => args.add(Option::<i64>::None),
                Value::Text(s) => args.add(s.clone()),
                Value::Integer(i) => args.add(*i),
                Value::Real(r) => args.add(*r),
                Value::Bool(b) => args.add(*b as i64),
                Value::Json(j) => args.add(serde_json::to_string(j).map_err(|e| TreeError::data_model(e.to_string()))?),
                Value::JsonList(list) => args.add(
                    serde_json::to_string(list).map_err(|e| TreeError::data_model(e.to_string()))?,
                ),
            }
        }
        Ok(args)
    }

    /// Retry a fallible operation on SQLITE_BUSY/SQLITE_LOCKED, rebuilding
    /// its bound arguments from scratch on every attempt rather than
    /// threading a single pre-bound `SqliteArguments` through retries.
    async fn with_busy_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(TreeError::Storage(err))
                    if attempt < self.busy_retries && TreeError::is_retryable_busy(&err) =>
                {
                    attempt += 1;
                    tracing::debug!(attempt, "retrying after SQLITE_BUSY/LOCKED");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Execute one statement with bound values, returning rows affected.
    pub async fn execute(&self, sql: &str, values: &[Value]) -> Result<u64> {
        self.with_busy_retry(|| async {
            let args = Self::bind(values)?;
            Ok(sqlx::query_with(sql, args).execute(&self.pool).await?.rows_affected())
        })
        .await
    }

    /// Execute a batch of `;`-separated DDL statements (CREATE TABLE /
    /// TRIGGER blocks), each run in order against the same connection.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_busy_retry(|| async {
            sqlx::query(sql).execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    pub async fn fetch_optional(
        &self,
        sql: &str,
        values: &[Value],
        kinds: &HashMap<String, FieldKind>,
    ) -> Result<Option<Record>> {
        let row = self
            .with_busy_retry(|| async {
                let args = Self::bind(values)?;
                Ok(sqlx::query_with(sql, args).fetch_optional(&self.pool).await?)
            })
            .await?;
        row.map(|r| decode::decode_row(&r, kinds)).transpose()
    }

    pub async fn fetch_all(
        &self,
        sql: &str,
        values: &[Value],
        kinds: &HashMap<String, FieldKind>,
    ) -> Result<Vec<Record>> {
        let rows: Vec<_> = self
            .with_busy_retry(|| async {
                let args = Self::bind(values)?;
                Ok(sqlx::query_with(sql, args).fetch_all(&self.pool).await?)
            })
            .await?;
        rows.iter().map(|r| decode::decode_row(r, kinds)).collect()
    }

    pub async fn scalar_i64(&self, sql: &str, values: &[Value]) -> Result<i64> {
        let row = self
            .with_busy_retry(|| async {
                let args = Self::bind(values)?;
                Ok(sqlx::query_with(sql, args).fetch_one(&self.pool).await?)
            })
            .await?;
        Ok(row.try_get::<i64, _>(0).unwrap_or_default())
    }

    /// `SELECT name FROM sqlite_master WHERE type='table' AND name LIKE '<tree>__%'`.
    pub async fn table_names(&self, tree_name: &str) -> Result<Vec<String>> {
        let pattern = format!("{tree_name}__%");
        let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name LIKE ?")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    /// Begin a transaction, the unit of atomicity every `Tree` mutation
    /// commits once at the end of (spec.md §5), matching
    /// `ArborStorage::tree_create`'s `self.pool.begin().await?` pattern.
    pub async fn begin(&self) -> Result<EngineTransaction<'_>> {
        Ok(EngineTransaction { tx: self.pool.begin().await? })
    }
}

/// A handle to one open transaction. Not retried on SQLITE_BUSY: a busy
/// conflict inside a transaction aborts it rather than silently reordering
/// statements around a retry.
pub struct EngineTransaction<'c> {
    tx: sqlx::Transaction<'c, sqlx::Sqlite>,
}

impl<'c> EngineTransaction<'c> {
    pub async fn execute(&mut self, sql: &str, values: &[Value]) -> Result<u64> {
        let args = Engine::bind(values)?;
        Ok(sqlx::query_with(sql, args).execute(&mut *self.tx).await?.rows_affected())
    }

    pub async fn fetch_optional(
        &mut self,
        sql: &str,
        values: &[Value],
        kinds: &HashMap<String, FieldKind>,
    ) -> Result<Option<Record>> {
        let args = Engine::bind(values)?;
        let row = sqlx::query_with(sql, args).fetch_optional(&mut *self.tx).await?;
        row.map(|r| decode::decode_row(&r, kinds)).transpose()
    }

    pub async fn fetch_all(
        &mut self,
        sql: &str,
        values: &[Value],
        kinds: &HashMap<String, FieldKind>,
    ) -> Result<Vec<Record>> {
        let args = Engine::bind(values)?;
        let rows = sqlx::query_with(sql, args).fetch_all(&mut *self.tx).await?;
        rows.iter().map(|r| decode::decode_row(r, kinds)).collect()
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
