//! The person aggregate and its repository.

mod error;
mod repo;

pub use error::{PersonError, SaveStep};
pub use repo::PersonRepository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Person with one phone number and one postal address.
///
/// Materialized from the `person`, `phone`, `address_join` and `address`
/// tables and decomposed back into them on save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersonInfo {
    pub name: String,
    pub age: i32,
    pub phone_number: String,
    pub city: String,
    pub state: String,
    pub street1: String,
    pub street2: String,
    pub zip_code: String,
}

/// Keys generated by a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SavedPerson {
    pub person_id: i64,
    pub address_id: i64,
}

/// Read and write access to stored persons.
#[async_trait]
pub trait PersonStore: Send + Sync {
    /// Fetch the joined record for `id`.
    ///
    /// # Errors
    /// `PersonError::InvalidId` for `id <= 0` (no query is issued),
    /// `PersonError::NotFound` when nothing joins, `PersonError::Db` otherwise.
    async fn retrieve(&self, id: i64) -> Result<PersonInfo, PersonError>;

    /// Insert the person, phone, address and join rows in one transaction.
    ///
    /// # Errors
    /// Returns the failing step; nothing is persisted when this fails.
    async fn save(&self, person: &PersonInfo) -> Result<SavedPerson, PersonError>;
}
