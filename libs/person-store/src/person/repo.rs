use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{PersonError, PersonInfo, PersonStore, SaveStep, SavedPerson};
use crate::dialect::{Dialect, DialectKind};
use crate::sql::{Insert, PlaceholderStyle, SqlValue};
use crate::{DbError, DbHandle, DbPool, DbTransaction};

const PERSON_COLUMNS: &[&str] = &["name", "age"];
const PHONE_COLUMNS: &[&str] = &["number", "person_id"];
const ADDRESS_COLUMNS: &[&str] = &["city", "state", "street1", "street2", "zip_code"];
const ADDRESS_JOIN_COLUMNS: &[&str] = &["person_id", "address_id"];

/// SQL-backed [`PersonStore`] over an injected [`DbHandle`].
#[derive(Debug, Clone)]
pub struct PersonRepository {
    db: DbHandle,
    dialect: Arc<dyn Dialect>,
}

impl PersonRepository {
    /// Repository using the default dialect for the handle's engine.
    #[must_use]
    pub fn new(db: DbHandle) -> Self {
        let dialect = DialectKind::default_for(db.engine()).dialect();
        Self { db, dialect }
    }

    /// Repository using an explicit dialect.
    ///
    /// # Errors
    /// Returns `DbError::InvalidConfig` if `dialect` cannot run on the
    /// handle's engine.
    pub fn with_dialect(db: DbHandle, dialect: Arc<dyn Dialect>) -> Result<Self, DbError> {
        if !dialect.supports(db.engine()) {
            return Err(DbError::InvalidConfig(format!(
                "dialect '{}' is not supported by {}",
                dialect.name(),
                db.engine()
            )));
        }
        Ok(Self { db, dialect })
    }

    #[must_use]
    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    async fn insert_rows(
        &self,
        tx: &mut DbTransaction<'_>,
        person: &PersonInfo,
    ) -> Result<SavedPerson, PersonError> {
        let person_id = self
            .dialect
            .insert_returning_id(
                tx,
                &Insert::new(
                    "person",
                    PERSON_COLUMNS,
                    vec![SqlValue::Text(&person.name), SqlValue::Int(person.age)],
                ),
            )
            .await
            .map_err(PersonError::step(SaveStep::InsertPerson))?;

        self.dialect
            .insert(
                tx,
                &Insert::new(
                    "phone",
                    PHONE_COLUMNS,
                    vec![
                        SqlValue::Text(&person.phone_number),
                        SqlValue::BigInt(person_id),
                    ],
                ),
            )
            .await
            .map_err(PersonError::step(SaveStep::InsertPhone))?;

        let address_id = self
            .dialect
            .insert_returning_id(
                tx,
                &Insert::new(
                    "address",
                    ADDRESS_COLUMNS,
                    vec![
                        SqlValue::Text(&person.city),
                        SqlValue::Text(&person.state),
                        SqlValue::Text(&person.street1),
                        SqlValue::Text(&person.street2),
                        SqlValue::Text(&person.zip_code),
                    ],
                ),
            )
            .await
            .map_err(PersonError::step(SaveStep::InsertAddress))?;

        self.dialect
            .insert(
                tx,
                &Insert::new(
                    "address_join",
                    ADDRESS_JOIN_COLUMNS,
                    vec![SqlValue::BigInt(person_id), SqlValue::BigInt(address_id)],
                ),
            )
            .await
            .map_err(PersonError::step(SaveStep::InsertAddressJoin))?;

        Ok(SavedPerson {
            person_id,
            address_id,
        })
    }
}

#[async_trait]
impl PersonStore for PersonRepository {
    async fn retrieve(&self, id: i64) -> Result<PersonInfo, PersonError> {
        if id <= 0 {
            return Err(PersonError::InvalidId(id));
        }

        let sql = select_person_sql(self.dialect.placeholder_style());
        // A person joined to several phones or addresses yields several rows;
        // the first one wins.
        let row = match self.db.pool() {
            #[cfg(feature = "pg")]
            DbPool::Postgres(pool) => {
                sqlx::query_as::<_, PersonInfo>(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            }
            #[cfg(feature = "mysql")]
            DbPool::MySql(pool) => {
                sqlx::query_as::<_, PersonInfo>(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            }
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => {
                sqlx::query_as::<_, PersonInfo>(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            }
        }
        .map_err(DbError::from)?;

        row.ok_or(PersonError::NotFound(id))
    }

    async fn save(&self, person: &PersonInfo) -> Result<SavedPerson, PersonError> {
        let mut tx = self.db.begin().await.map_err(PersonError::Begin)?;

        let saved = match self.insert_rows(&mut tx, person).await {
            Ok(saved) => saved,
            Err(err) => return Err(rollback(tx, err).await),
        };

        tx.commit().await.map_err(PersonError::Commit)?;
        debug!(
            person_id = saved.person_id,
            address_id = saved.address_id,
            dialect = self.dialect.name(),
            "person saved"
        );
        Ok(saved)
    }
}

async fn rollback(tx: DbTransaction<'_>, err: PersonError) -> PersonError {
    warn!(error = %err, "person save failed, rolling back");
    match tx.rollback().await {
        Ok(()) => err,
        Err(source) => {
            warn!(error = %source, "rollback of person save failed");
            PersonError::Rollback {
                source,
                original: Box::new(err),
            }
        }
    }
}

fn select_person_sql(style: PlaceholderStyle) -> String {
    format!(
        "SELECT p.name, p.age, ph.number AS phone_number, \
         a.city, a.state, a.street1, a.street2, a.zip_code \
         FROM person p \
         JOIN phone ph ON p.id = ph.person_id \
         JOIN address_join aj ON p.id = aj.person_id \
         JOIN address a ON aj.address_id = a.id \
         WHERE p.id = {}",
        style.placeholder(1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_is_parameterized_per_style() {
        let positional = select_person_sql(PlaceholderStyle::Positional);
        assert!(positional.ends_with("WHERE p.id = ?"), "{positional}");
        assert!(positional.contains("ph.number AS phone_number"));

        let numbered = select_person_sql(PlaceholderStyle::Numbered);
        assert!(numbered.ends_with("WHERE p.id = $1"), "{numbered}");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn non_positive_ids_never_reach_the_database() -> crate::Result<()> {
        use crate::ConnectOpts;

        // No schema: any issued query would fail with "no such table".
        let opts = ConnectOpts {
            max_conns: Some(1),
            ..Default::default()
        };
        let repo = PersonRepository::new(DbHandle::connect("sqlite::memory:", opts).await?);

        for id in [0, -1, i64::MIN] {
            let err = repo.retrieve(id).await.unwrap_err();
            assert!(matches!(err, PersonError::InvalidId(got) if got == id), "{err}");
        }

        let err = repo.retrieve(1).await.unwrap_err();
        assert!(matches!(err, PersonError::Db(DbError::Sqlx(_))), "{err}");
        Ok(())
    }
}
