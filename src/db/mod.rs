//! Postgres access: pool, migrations, health check.
//!
//! One pool serves both halves of the pipeline, the topic log (pgmq,
//! in [`queue`]) and the articles store (in [`news`]).

pub mod news;
pub mod queue;

use std::time::Duration;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::warn;

/// Handle to the shared connection pool. Cheap to clone; pollers,
/// publisher, and consumer all hold the same pool.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect and build the pool, failing fast if Postgres is down.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Connect, retrying until Postgres becomes reachable.
    ///
    /// Long-running daemons use this at startup so a late-starting
    /// database does not kill them. One-shot commands call
    /// [`Db::connect`] and fail fast instead.
    pub async fn connect_with_backoff(url: &str, retry_secs: u64) -> Self {
        loop {
            match Self::connect(url).await {
                Ok(db) => return db,
                Err(e) => {
                    warn!(error = %e, retry_secs, "database unavailable, retrying");
                    tokio::time::sleep(Duration::from_secs(retry_secs)).await;
                }
            }
        }
    }

    /// Apply pending migrations from `./migrations`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Round-trip check (SELECT 1) against the pool.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Pool access for the consumer's LISTEN connection.
    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
