#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Person aggregate persistence over `PostgreSQL`, `MySQL` and `SQLite`.
//!
//! A person (name, age, phone number, postal address) is stored across four
//! tables: `person`, `phone`, `address` and `address_join`. This crate reads
//! the joined record back by id and writes a new person atomically, hiding the
//! dialect differences (placeholder syntax, generated key retrieval) behind the
//! [`Dialect`] strategy.
//!
//! # Features
//! - `pg`, `mysql`, `sqlite`: enable `SQLx` backends (`sqlite` is the default)
//! - `integration`: container-backed tests for `PostgreSQL` and `MySQL`
//!
//! # Example
//! ```rust,no_run
//! use person_store::{ConnectOpts, DbHandle, PersonInfo, PersonRepository, PersonStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DbHandle::connect("sqlite://people.db", ConnectOpts::default()).await?;
//! let repo = PersonRepository::new(db);
//!
//! let saved = repo
//!     .save(&PersonInfo {
//!         name: "Alice".to_owned(),
//!         age: 30,
//!         phone_number: "555-1234".to_owned(),
//!         city: "Springfield".to_owned(),
//!         state: "IL".to_owned(),
//!         street1: "1 Main St".to_owned(),
//!         street2: String::new(),
//!         zip_code: "62701".to_owned(),
//!     })
//!     .await?;
//! let alice = repo.retrieve(saved.person_id).await?;
//! assert_eq!(alice.name, "Alice");
//! # Ok(())
//! # }
//! ```

#[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
compile_error!("enable at least one database backend feature: `pg`, `mysql` or `sqlite`");

pub mod config;
pub mod dialect;
pub mod person;
pub mod sql;

mod pool_opts;

pub use config::{PersonStoreConfig, redact_credentials_in_dsn};
pub use dialect::{AutoIncrementDialect, Dialect, DialectKind, ReturningDialect};
pub use person::{PersonError, PersonInfo, PersonRepository, PersonStore, SaveStep, SavedPerson};
pub use sql::{Insert, PlaceholderStyle, SqlValue};

use std::fmt;
use std::time::Duration;

use pool_opts::ApplyPoolOpts;
use serde::Deserialize;
use sql::{bind_values, decode_i64};
use thiserror::Error;

#[cfg(feature = "mysql")]
use sqlx::{MySql, MySqlPool, mysql::MySqlPoolOptions};
#[cfg(feature = "pg")]
use sqlx::{PgPool, Postgres, postgres::PgPoolOptions};
#[cfg(feature = "sqlite")]
use sqlx::{
    Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Typed error for the DB handle, SQL building and configuration.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("insert into '{0}' returned no generated id")]
    MissingGeneratedId(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error(transparent)]
    Config(Box<figment::Error>),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<figment::Error> for DbError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DbEngine::Postgres => "postgres",
            DbEngine::MySql => "mysql",
            DbEngine::Sqlite => "sqlite",
        })
    }
}

/// Pool options; each driver applies the subset it supports.
///
/// Durations deserialize from humantime strings such as `"30s"` or `"5m"`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectOpts {
    /// Maximum number of connections in the pool.
    pub max_conns: Option<u32>,
    /// Minimum number of connections in the pool.
    pub min_conns: Option<u32>,
    /// Timeout to acquire a connection from the pool.
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    /// Idle timeout before a connection is closed.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime for a connection.
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Option<Duration>,
    /// Test connection health before acquire.
    pub test_before_acquire: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
            test_before_acquire: false,
        }
    }
}

/// One concrete sqlx pool.
#[derive(Clone, Debug)]
pub enum DbPool {
    #[cfg(feature = "pg")]
    Postgres(PgPool),
    #[cfg(feature = "mysql")]
    MySql(MySqlPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

/// Result of a statement executed inside a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Key generated by the statement, when the driver reports one.
    /// Always `None` on `PostgreSQL`.
    pub last_insert_id: Option<i64>,
}

/// Database transaction wrapper (lifetime-bound to the pool).
pub enum DbTransaction<'a> {
    #[cfg(feature = "pg")]
    Postgres(sqlx::Transaction<'a, Postgres>),
    #[cfg(feature = "mysql")]
    MySql(sqlx::Transaction<'a, MySql>),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::Transaction<'a, Sqlite>),
}

impl DbTransaction<'_> {
    #[must_use]
    pub fn engine(&self) -> DbEngine {
        match self {
            #[cfg(feature = "pg")]
            DbTransaction::Postgres(_) => DbEngine::Postgres,
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(_) => DbEngine::MySql,
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(_) => DbEngine::Sqlite,
        }
    }

    /// Execute one statement with positionally bound values.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub async fn execute(&mut self, sql: &str, values: &[SqlValue<'_>]) -> Result<ExecOutcome> {
        match self {
            #[cfg(feature = "pg")]
            DbTransaction::Postgres(tx) => {
                let done = bind_values(sqlx::query::<Postgres>(sql), values)
                    .execute(&mut **tx)
                    .await?;
                Ok(ExecOutcome {
                    rows_affected: done.rows_affected(),
                    last_insert_id: None,
                })
            }
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(tx) => {
                let done = bind_values(sqlx::query::<MySql>(sql), values)
                    .execute(&mut **tx)
                    .await?;
                // MySQL reports 0 when the statement generated no key.
                let last_insert_id = i64::try_from(done.last_insert_id())
                    .ok()
                    .filter(|id| *id > 0);
                Ok(ExecOutcome {
                    rows_affected: done.rows_affected(),
                    last_insert_id,
                })
            }
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(tx) => {
                let done = bind_values(sqlx::query::<Sqlite>(sql), values)
                    .execute(&mut **tx)
                    .await?;
                Ok(ExecOutcome {
                    rows_affected: done.rows_affected(),
                    last_insert_id: Some(done.last_insert_rowid()),
                })
            }
        }
    }

    /// Run a query and read the first column of its first row as `i64`.
    ///
    /// 32-bit integer columns (`SERIAL`, `INT`) are widened.
    ///
    /// # Errors
    /// Returns an error if the query fails, yields no row, or the column is
    /// not an integer.
    pub async fn fetch_i64(&mut self, sql: &str, values: &[SqlValue<'_>]) -> Result<i64> {
        match self {
            #[cfg(feature = "pg")]
            DbTransaction::Postgres(tx) => {
                let row = bind_values(sqlx::query::<Postgres>(sql), values)
                    .fetch_one(&mut **tx)
                    .await?;
                Ok(decode_i64(&row)?)
            }
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(tx) => {
                let row = bind_values(sqlx::query::<MySql>(sql), values)
                    .fetch_one(&mut **tx)
                    .await?;
                Ok(decode_i64(&row)?)
            }
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(tx) => {
                let row = bind_values(sqlx::query::<Sqlite>(sql), values)
                    .fetch_one(&mut **tx)
                    .await?;
                Ok(decode_i64(&row)?)
            }
        }
    }

    /// Commit the transaction.
    ///
    /// # Errors
    /// Returns an error if the commit operation fails.
    pub async fn commit(self) -> Result<()> {
        match self {
            #[cfg(feature = "pg")]
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(Into::into),
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(tx) => tx.commit().await.map_err(Into::into),
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(tx) => tx.commit().await.map_err(Into::into),
        }
    }

    /// Roll back the transaction.
    ///
    /// # Errors
    /// Returns an error if the rollback operation fails.
    pub async fn rollback(self) -> Result<()> {
        match self {
            #[cfg(feature = "pg")]
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(Into::into),
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(tx) => tx.rollback().await.map_err(Into::into),
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(tx) => tx.rollback().await.map_err(Into::into),
        }
    }
}

/// Main handle: the engine tag plus its pool. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct DbHandle {
    engine: DbEngine,
    pool: DbPool,
    dsn: String,
}

#[cfg(feature = "sqlite")]
const DEFAULT_SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl DbHandle {
    /// Detect engine by DSN.
    ///
    /// Note: we only check scheme prefixes and don't mutate the tail (credentials etc.).
    ///
    /// # Errors
    /// Returns `DbError::UnknownDsn` if the DSN scheme is not recognized.
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        // Trim only leading spaces/newlines to be forgiving with env files.
        let s = dsn.trim_start();

        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbEngine::Postgres)
        } else if s.starts_with("mysql://") {
            Ok(DbEngine::MySql)
        } else if s.starts_with("sqlite:") {
            Ok(DbEngine::Sqlite)
        } else {
            Err(DbError::UnknownDsn(redact_credentials_in_dsn(dsn)))
        }
    }

    /// Connect and build handle.
    ///
    /// # Errors
    /// Returns an error if the DSN is invalid, its engine is not compiled in,
    /// or the connection fails.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        let engine = Self::detect(dsn)?;
        let redacted = redact_credentials_in_dsn(dsn);
        tracing::debug!(dsn = %redacted, %engine, "connecting to database");

        let pool = match engine {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => DbPool::Postgres(PgPoolOptions::new().apply(&opts).connect(dsn).await?),
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => return Err(DbError::FeatureDisabled("PostgreSQL feature not enabled")),
            #[cfg(feature = "mysql")]
            DbEngine::MySql => DbPool::MySql(MySqlPoolOptions::new().apply(&opts).connect(dsn).await?),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => return Err(DbError::FeatureDisabled("MySQL feature not enabled")),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => {
                use std::str::FromStr;

                let options = SqliteConnectOptions::from_str(dsn)?
                    .create_if_missing(true)
                    .busy_timeout(DEFAULT_SQLITE_BUSY_TIMEOUT);
                DbPool::Sqlite(
                    SqlitePoolOptions::new()
                        .apply(&opts)
                        .connect_with(options)
                        .await?,
                )
            }
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => return Err(DbError::FeatureDisabled("SQLite feature not enabled")),
        };

        Ok(Self {
            engine,
            pool,
            dsn: redacted,
        })
    }

    /// Graceful pool close. (Dropping the pool also closes it; this just makes it explicit.)
    pub async fn close(self) {
        match self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(p) => p.close().await,
            #[cfg(feature = "mysql")]
            DbPool::MySql(p) => p.close().await,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(p) => p.close().await,
        }
    }

    /// Get the backend.
    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    /// Get the DSN used for this connection, with the password redacted.
    #[must_use]
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Begin a transaction (returns appropriate transaction type based on backend).
    ///
    /// # Errors
    /// Returns an error if the transaction cannot be started.
    pub async fn begin(&self) -> Result<DbTransaction<'_>> {
        match &self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(pool) => Ok(DbTransaction::Postgres(pool.begin().await?)),
            #[cfg(feature = "mysql")]
            DbPool::MySql(pool) => Ok(DbTransaction::MySql(pool.begin().await?)),
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => Ok(DbTransaction::Sqlite(pool.begin().await?)),
        }
    }
}

// ===================== tests =====================
