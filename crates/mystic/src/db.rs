pub mod ids;
pub mod queries;
pub mod tables;

use crate::{Error, Result};
use anyhow::{anyhow, Context};
use chrono::Utc;
pub use ids::*;
use sea_orm::{
    entity::prelude::DateTimeUtc,
    sea_query::{Expr, OnConflict},
    ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, TransactionTrait,
};
pub use sea_orm::ConnectOptions;
use std::{collections::HashMap, future::Future, ops::Deref, path::Path, sync::Arc, time::Duration};
pub use tables::user_profile::{self, PlanType};

pub use tables::user_profile::Model as UserProfile;

/// Number of free readings a freshly created profile starts with.
pub const DEFAULT_FREE_READINGS: i32 = 5;

const MAX_TRANSACTION_RETRIES: usize = 3;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Outcome of the post-generation usage commit.
#[derive(Debug, PartialEq, Eq)]
pub enum UsageCommit {
    Committed,
    /// The conditional decrement found no quota left: a concurrent request
    /// won the race between the entitlement check and this commit.
    QuotaExhausted,
}

pub struct Database {
    options: ConnectOptions,
    pub(crate) pool: DatabaseConnection,
}

impl Database {
    /// Connects to the database, retrying once before surfacing the failure.
    pub async fn new(options: ConnectOptions) -> Result<Self> {
        let pool = crate::retry::retry_with_backoff(2, CONNECT_RETRY_DELAY, || {
            sea_orm::Database::connect(options.clone())
        })
        .await
        .context("database unavailable")?;

        Ok(Self { options, pool })
    }

    pub async fn migrate(
        &self,
        migrations_path: &Path,
        ignore_checksum_mismatch: bool,
    ) -> anyhow::Result<Vec<(sqlx::migrate::Migration, Duration)>> {
        use sqlx::migrate::{Migrate, MigrationSource};
        use sqlx::Connection;

        let migrations = MigrationSource::resolve(migrations_path)
            .await
            .map_err(|error| anyhow!("failed to load migrations: {error:?}"))?;

        sqlx::any::install_default_drivers();
        let mut connection = sqlx::AnyConnection::connect(self.options.get_url()).await?;

        connection.ensure_migrations_table().await?;
        let applied_migrations: HashMap<i64, _> = connection
            .list_applied_migrations()
            .await?
            .into_iter()
            .map(|migration| (migration.version, migration))
            .collect();

        let mut new_migrations = Vec::new();
        for migration in migrations {
            match applied_migrations.get(&migration.version) {
                Some(applied_migration) => {
                    if migration.checksum != applied_migration.checksum && !ignore_checksum_mismatch
                    {
                        Err(anyhow!(
                            "checksum mismatch for applied migration {}",
                            migration.description
                        ))?;
                    }
                }
                None => {
                    let elapsed = connection.apply(&migration).await?;
                    new_migrations.push((migration, elapsed));
                }
            }
        }

        Ok(new_migrations)
    }

    /// Runs `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`. Serialization conflicts are retried a bounded number of times.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Send + Fn(TransactionHandle) -> Fut,
        Fut: Send + Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            let tx = TransactionHandle(Arc::new(Some(self.pool.begin().await?)));
            match f(tx.clone()).await {
                Ok(result) => match Arc::try_unwrap(tx.0) {
                    Ok(Some(tx)) => match tx.commit().await {
                        Ok(()) => return Ok(result),
                        Err(error) => {
                            if is_serialization_error(&error) && retries < MAX_TRANSACTION_RETRIES {
                                retries += 1;
                                continue;
                            }
                            return Err(error.into());
                        }
                    },
                    _ => {
                        return Err(anyhow!(
                            "couldn't commit transaction because it's still in use"
                        )
                        .into())
                    }
                },
                Err(error) => {
                    if let Ok(Some(tx)) = Arc::try_unwrap(tx.0) {
                        tx.rollback().await.ok();
                    }
                    let retry = match &error {
                        Error::Database(db_error) => {
                            is_serialization_error(db_error) || is_connection_error(db_error)
                        }
                        _ => false,
                    };
                    if retry && retries < MAX_TRANSACTION_RETRIES {
                        retries += 1;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }
}

fn is_serialization_error(error: &sea_orm::DbErr) -> bool {
    // Postgres serialization_failure, and sqlite's busy handler giving up.
    const SERIALIZATION_FAILURE_CODE: &str = "40001";
    let text = error.to_string();
    text.contains(SERIALIZATION_FAILURE_CODE) || text.contains("database is locked")
}

fn is_connection_error(error: &sea_orm::DbErr) -> bool {
    matches!(
        error,
        sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_)
    )
}

#[derive(Clone)]
pub struct TransactionHandle(Arc<Option<DatabaseTransaction>>);

impl Deref for TransactionHandle {
    type Target = DatabaseTransaction;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref().as_ref().unwrap()
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct TestDb {
    pub db: Option<Arc<Database>>,
}

#[cfg(any(test, feature = "test-support"))]
impl TestDb {
    pub async fn sqlite() -> Self {
        // A pool larger than one connection would hand each connection its
        // own private in-memory database.
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1);
        let db = Database::new(options).await.unwrap();

        let sql = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations.sqlite/20250801000000_test_schema.sql"
        ));
        db.pool
            .execute(sea_orm::Statement::from_string(
                db.pool.get_database_backend(),
                sql.to_string(),
            ))
            .await
            .unwrap();

        Self {
            db: Some(Arc::new(db)),
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        self.db.as_ref().unwrap()
    }
}
