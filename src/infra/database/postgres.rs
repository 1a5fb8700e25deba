//! PostgreSQL transaction store implementation.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::{AppError, DatabaseError, StagedWrite, StoredTransaction, TransactionStore};

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

const SELECT_COLUMNS: &str = "hash, lt, account_address, success, utime, webhook_notified, \
     webhook_notified_at, transaction_data, created_at";

/// PostgreSQL transaction store with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Parse a database row into a StoredTransaction.
    /// An undecodable payload is dropped rather than failing the read.
    fn row_to_transaction(row: &sqlx::postgres::PgRow) -> Result<StoredTransaction, AppError> {
        let hash: String = row.try_get("hash").map_err(DatabaseError::from)?;
        let transaction_data = match row.try_get::<Option<Value>, _>("transaction_data") {
            Ok(data) => data,
            Err(e) => {
                warn!(hash = %hash, error = %e, "Failed to decode stored transaction data");
                None
            }
        };

        Ok(StoredTransaction {
            lt: row.try_get("lt").map_err(DatabaseError::from)?,
            account_address: row.try_get("account_address").map_err(DatabaseError::from)?,
            success: row.try_get("success").map_err(DatabaseError::from)?,
            utime: row.try_get("utime").map_err(DatabaseError::from)?,
            webhook_notified: row.try_get("webhook_notified").map_err(DatabaseError::from)?,
            webhook_notified_at: row
                .try_get("webhook_notified_at")
                .map_err(DatabaseError::from)?,
            created_at: row.try_get("created_at").map_err(DatabaseError::from)?,
            transaction_data,
            hash,
        })
    }
}

#[async_trait]
impl TransactionStore for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn max_lt(&self, account_address: &str) -> Result<i64, AppError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(lt), 0) AS max_lt
            FROM transactions
            WHERE account_address = $1
            "#,
        )
        .bind(account_address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(row.try_get("max_lt").map_err(DatabaseError::from)?)
    }

    #[instrument(skip(self))]
    async fn get_by_hash(&self, hash: &str) -> Result<Option<StoredTransaction>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE hash = $1",
            SELECT_COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    #[instrument(skip(self))]
    async fn get_unnotified(&self) -> Result<Vec<StoredTransaction>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE webhook_notified = FALSE ORDER BY utime ASC, lt ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    #[instrument(skip(self, writes), fields(writes = writes.len()))]
    async fn apply_batch(&self, writes: &[StagedWrite]) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;

        let (mut inserted, mut updated, mut notified) = (0u64, 0u64, 0u64);
        for write in writes {
            match write {
                StagedWrite::Insert(row) => {
                    inserted += sqlx::query(
                        r#"
                        INSERT INTO transactions (
                            hash, lt, account_address, success, utime,
                            webhook_notified, webhook_notified_at, transaction_data, created_at
                        )
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                        ON CONFLICT (hash) DO NOTHING
                        "#,
                    )
                    .bind(&row.hash)
                    .bind(row.lt)
                    .bind(&row.account_address)
                    .bind(row.success)
                    .bind(row.utime)
                    .bind(row.webhook_notified)
                    .bind(row.webhook_notified_at)
                    .bind(&row.transaction_data)
                    .bind(row.created_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| AppError::Database(DatabaseError::from(e)))?
                    .rows_affected();
                }
                StagedWrite::Update(row) => {
                    updated += sqlx::query(
                        r#"
                        UPDATE transactions
                        SET success = success OR $2,
                            utime = $3,
                            transaction_data = $4
                        WHERE hash = $1
                        "#,
                    )
                    .bind(&row.hash)
                    .bind(row.success)
                    .bind(row.utime)
                    .bind(&row.transaction_data)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| AppError::Database(DatabaseError::from(e)))?
                    .rows_affected();
                }
                StagedWrite::MarkNotified { hash, notified_at } => {
                    notified += sqlx::query(
                        r#"
                        UPDATE transactions
                        SET webhook_notified = TRUE,
                            webhook_notified_at = $2
                        WHERE hash = $1
                        "#,
                    )
                    .bind(hash)
                    .bind(notified_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| AppError::Database(DatabaseError::from(e)))?
                    .rows_affected();
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        debug!(inserted, updated, notified, "Applied transaction batch");
        Ok(())
    }
}
