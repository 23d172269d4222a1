//! SQL dialect strategies.
//!
//! A dialect decides two things the repository must not care about: how
//! placeholders are written and how the key generated by an insert is read
//! back. Two strategies exist:
//!
//! - [`AutoIncrementDialect`]: `?` placeholders, key from the driver's
//!   last-insert-id (`MySQL`, `SQLite`).
//! - [`ReturningDialect`]: `$n` placeholders, key from `RETURNING id`
//!   (`PostgreSQL`, `SQLite`).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::sql::{Insert, PlaceholderStyle};
use crate::{DbEngine, DbError, DbTransaction, Result};

/// Dialect-specific statement rendering and generated key retrieval.
#[async_trait]
pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Whether statements produced by this dialect run on `engine`.
    fn supports(&self, engine: DbEngine) -> bool;

    /// Insert one row and return the key generated for its `id` column.
    ///
    /// # Errors
    /// Returns an error if the insert fails or no key could be read back.
    async fn insert_returning_id(
        &self,
        tx: &mut DbTransaction<'_>,
        insert: &Insert<'_>,
    ) -> Result<i64>;

    /// Insert one row without reading a key back.
    ///
    /// # Errors
    /// Returns an error if the statement cannot be rendered or fails.
    async fn insert(&self, tx: &mut DbTransaction<'_>, insert: &Insert<'_>) -> Result<()> {
        let sql = insert.to_sql(self.placeholder_style())?;
        tx.execute(&sql, insert.values()).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AutoIncrementDialect;

#[async_trait]
impl Dialect for AutoIncrementDialect {
    fn name(&self) -> &'static str {
        "auto_increment"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Positional
    }

    fn supports(&self, engine: DbEngine) -> bool {
        matches!(engine, DbEngine::MySql | DbEngine::Sqlite)
    }

    async fn insert_returning_id(
        &self,
        tx: &mut DbTransaction<'_>,
        insert: &Insert<'_>,
    ) -> Result<i64> {
        let sql = insert.to_sql(self.placeholder_style())?;
        let outcome = tx.execute(&sql, insert.values()).await?;
        outcome
            .last_insert_id
            .ok_or_else(|| DbError::MissingGeneratedId(insert.table().to_owned()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReturningDialect;

#[async_trait]
impl Dialect for ReturningDialect {
    fn name(&self) -> &'static str {
        "returning"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }

    fn supports(&self, engine: DbEngine) -> bool {
        matches!(engine, DbEngine::Postgres | DbEngine::Sqlite)
    }

    async fn insert_returning_id(
        &self,
        tx: &mut DbTransaction<'_>,
        insert: &Insert<'_>,
    ) -> Result<i64> {
        let sql = format!("{} RETURNING id", insert.to_sql(self.placeholder_style())?);
        tx.fetch_i64(&sql, insert.values()).await
    }
}

/// Dialect selector as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    AutoIncrement,
    Returning,
}

impl DialectKind {
    /// Dialect used when configuration does not name one.
    #[must_use]
    pub fn default_for(engine: DbEngine) -> Self {
        match engine {
            DbEngine::Postgres => DialectKind::Returning,
            DbEngine::MySql | DbEngine::Sqlite => DialectKind::AutoIncrement,
        }
    }

    #[must_use]
    pub fn dialect(self) -> Arc<dyn Dialect> {
        match self {
            DialectKind::AutoIncrement => Arc::new(AutoIncrementDialect),
            DialectKind::Returning => Arc::new(ReturningDialect),
        }
    }
}
