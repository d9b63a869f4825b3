//! # curric-db
//!
//! PostgreSQL system of record for curric.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgTagStore`], the relational [`TagStore`] over tags, parent links,
//!   locale mappings, legacy mappings, and grade products
//! - [`MemoryTagStore`], a journaled in-process store with fault injection
//!
//! ## Example
//!
//! ```rust,ignore
//! use curric_db::Database;
//!
//! let db = Database::connect("postgres://localhost/curric").await?;
//! db.migrate().await?;
//! let tag = db.tags.get_tag(42).await?;
//! ```

pub mod memory;
pub mod pool;
pub mod tags;
mod tags_tx;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

pub use curric_core::*;

pub use memory::{MemoryStoreTx, MemoryTagStore};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use tags::PgTagStore;
pub use tags_tx::PgStoreTx;

/// Database context: the pool and the tag repository over it.
#[derive(Clone)]
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub tags: PgTagStore,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            tags: PgTagStore::new(pool.clone()),
            pool,
        }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Connect using the process configuration.
    pub async fn from_config(config: &CurriculumConfig) -> Result<Self> {
        Self::connect_with_config(&config.database_url, PoolConfig::from_config(config)).await
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
