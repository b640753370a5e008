// =============================================================================
// DATABASE MODULE
// =============================================================================
// This module handles all persistence for contact messages.
//
// NOTES:
// - The driver is picked at runtime from the URL scheme (sqlx `Any`), so
//   the same code talks to PostgreSQL or the embedded SQLite file
// - The pool is created lazily: an unreachable database never stops startup
// - Each submission is one INSERT inside one transaction
// =============================================================================

use std::time::Duration;

use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use tracing::warn;

use crate::config::DatabaseConfig;
use crate::error::AppResult;
use crate::models::{Message, NewMessage};

// -----------------------------------------------------------------------------
// BACKEND
// -----------------------------------------------------------------------------
/// SQL dialect behind the pool. Only the DDL differs between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("sqlite:") {
            Backend::Sqlite
        } else {
            Backend::Postgres
        }
    }

    fn create_table_sql(&self) -> &'static str {
        match self {
            Backend::Postgres => {
                r#"
                CREATE TABLE IF NOT EXISTS message (
                    id BIGSERIAL PRIMARY KEY,
                    name VARCHAR(100) NOT NULL,
                    email VARCHAR(120) NOT NULL,
                    message VARCHAR(2000) NOT NULL
                )
                "#
            }
            // SQLite ignores VARCHAR lengths, so the limits are CHECKs.
            // AUTOINCREMENT keeps ids from being reused.
            Backend::Sqlite => {
                r#"
                CREATE TABLE IF NOT EXISTS message (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name VARCHAR(100) NOT NULL CHECK (length(name) <= 100),
                    email VARCHAR(120) NOT NULL CHECK (length(email) <= 120),
                    message VARCHAR(2000) NOT NULL CHECK (length(message) <= 2000)
                )
                "#
            }
        }
    }
}

// -----------------------------------------------------------------------------
// DATABASE WRAPPER
// -----------------------------------------------------------------------------
// Wraps the SQLx pool and exposes only the operations the service needs.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    backend: Backend,
}

impl Database {
    // -------------------------------------------------------------------------
    // CONNECTION
    // -------------------------------------------------------------------------
    /// Build a connection pool without opening a connection.
    ///
    /// Fails only when the URL cannot be understood by any installed driver.
    /// Reachability problems show up later, on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> AppResult<Self> {
        // Registers the postgres and sqlite drivers with `Any`; idempotent.
        install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(0)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Duration::from_secs(300))
            .connect_lazy(&config.url)?;

        Ok(Self {
            pool,
            backend: Backend::from_url(&config.url),
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    // -------------------------------------------------------------------------
    // SCHEMA
    // -------------------------------------------------------------------------
    /// Create the `message` table if it does not exist yet.
    ///
    /// IF NOT EXISTS makes this safe to run on every start and from several
    /// processes at once.
    pub async fn init_schema(&self) -> AppResult<()> {
        sqlx::query(self.backend.create_table_sql())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // WRITE OPERATIONS
    // -------------------------------------------------------------------------
    /// Store a validated message and return it with its generated id.
    ///
    /// On any failure the transaction is rolled back, so either exactly one
    /// row is committed or none is.
    pub async fn insert_message(&self, new: &NewMessage) -> AppResult<Message> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO message (name, email, message)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, message
            "#,
        )
        .bind(new.name())
        .bind(new.email())
        .bind(new.message())
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(message) => {
                tx.commit().await?;
                Ok(message)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed insert also failed");
                }
                Err(e.into())
            }
        }
    }

    // -------------------------------------------------------------------------
    // READ OPERATIONS
    // -------------------------------------------------------------------------
    /// Number of stored messages.
    pub async fn count_messages(&self) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM message")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    /// All stored messages, oldest first.
    #[cfg(test)]
    pub async fn list_messages(&self) -> AppResult<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT id, name, email, message FROM message ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    // -------------------------------------------------------------------------
    // HEALTH CHECK
    // -------------------------------------------------------------------------

    /// Check if database connection is healthy
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Close the pool; later queries fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
