//! Small SQL building blocks shared by the dialects.
//!
//! Statements are rendered as text with placeholders only; every value is
//! bound through the driver, never spliced into the SQL.

use sqlx::query::Query;
use sqlx::{ColumnIndex, Database, Decode, Encode, Row, Type};

use crate::{DbError, Result};

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlValue<'a> {
    Text(&'a str),
    Int(i32),
    BigInt(i64),
}

/// How placeholders are written in statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderStyle {
    /// `?`, bound by position (`MySQL`, `SQLite`).
    Positional,
    /// `$1`, `$2`, ... (`PostgreSQL`, also accepted by `SQLite`).
    Numbered,
}

impl PlaceholderStyle {
    /// Placeholder for the 1-based parameter `index`.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            PlaceholderStyle::Positional => "?".to_owned(),
            PlaceholderStyle::Numbered => format!("${index}"),
        }
    }

    /// Comma separated placeholders for `count` parameters.
    #[must_use]
    pub fn list(self, count: usize) -> String {
        (1..=count)
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Single-row `INSERT` statement.
#[derive(Debug, Clone)]
pub struct Insert<'a> {
    table: &'a str,
    columns: &'a [&'a str],
    values: Vec<SqlValue<'a>>,
}

impl<'a> Insert<'a> {
    #[must_use]
    pub fn new(table: &'a str, columns: &'a [&'a str], values: Vec<SqlValue<'a>>) -> Self {
        Self {
            table,
            columns,
            values,
        }
    }

    #[must_use]
    pub fn table(&self) -> &'a str {
        self.table
    }

    #[must_use]
    pub fn columns(&self) -> &'a [&'a str] {
        self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue<'a>] {
        &self.values
    }

    /// Render the statement text.
    ///
    /// # Errors
    /// Returns `DbError::InvalidParameter` if there are no columns or the
    /// number of values differs from the number of columns.
    pub fn to_sql(&self, style: PlaceholderStyle) -> Result<String> {
        if self.columns.is_empty() {
            return Err(DbError::InvalidParameter(format!(
                "insert into '{}' has no columns",
                self.table
            )));
        }
        if self.columns.len() != self.values.len() {
            return Err(DbError::InvalidParameter(format!(
                "insert into '{}' has {} columns but {} values",
                self.table,
                self.columns.len(),
                self.values.len()
            )));
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.columns.join(", "),
            style.list(self.values.len())
        ))
    }
}

type BoundQuery<'q, DB> = Query<'q, DB, <DB as Database>::Arguments<'q>>;

/// Bind `values` in order onto `query`.
pub(crate) fn bind_values<'q, DB>(
    mut query: BoundQuery<'q, DB>,
    values: &[SqlValue<'q>],
) -> BoundQuery<'q, DB>
where
    DB: Database,
    &'q str: Encode<'q, DB> + Type<DB>,
    i32: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
{
    for value in values {
        query = match *value {
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Int(n) => query.bind(n),
            SqlValue::BigInt(n) => query.bind(n),
        };
    }
    query
}

/// Read column 0 as `i64`, widening 32-bit integers.
pub(crate) fn decode_i64<R>(row: &R) -> std::result::Result<i64, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i32: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<i64, _>(0)
        .or_else(|_| row.try_get::<i32, _>(0).map(i64::from))
}
