use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, SqlErr};
use sea_orm_migration::MigratorTrait;
use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub type DbPool = DatabaseConnection;

/// Pool tuning resolved from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// An in-memory SQLite database lives and dies with its connection, so it
    /// gets exactly one that never idles out.
    fn pool_bounds(&self) -> (u32, u32) {
        if self.url.contains(":memory:") {
            (1, 1)
        } else {
            let max = self.max_connections.max(1);
            (max, self.min_connections.min(max))
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let (max_connections, min_connections) = config.pool_bounds();
    debug!(?config, max_connections, min_connections, "Opening database pool");

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(options).await.map_err(|e| {
        error!(error = %e, "Could not open database pool");
        ServiceError::DatabaseError(e)
    })?;

    info!(max_connections, "Database pool ready");
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Applies every pending migration from [`crate::migrator::Migrator`].
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    match crate::migrator::Migrator::up(pool, None).await {
        Ok(()) => {
            info!(elapsed = ?started.elapsed(), "Schema is up to date");
            Ok(())
        }
        Err(e) => {
            error!(elapsed = ?started.elapsed(), error = %e, "Schema migration failed");
            Err(ServiceError::DatabaseError(e))
        }
    }
}

/// Round-trips a ping; used by the readiness probe.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    pool.ping().await.map_err(|e| {
        warn!(elapsed = ?started.elapsed(), error = %e, "Database ping failed");
        ServiceError::DatabaseError(e)
    })?;
    debug!(elapsed = ?started.elapsed(), "Database ping ok");
    Ok(())
}

/// Turns a write that matched no rows into the right error: the record was
/// either deleted or changed by someone else since it was read.
pub fn stale_write_error(entity: &str, id: impl Display, still_exists: bool) -> ServiceError {
    if still_exists {
        warn!(entity, id = %id, "Concurrent modification detected");
        ServiceError::ConcurrentModification(format!("{} {} was modified concurrently", entity, id))
    } else {
        ServiceError::NotFound(format!("{} {} not found", entity, id))
    }
}

/// Reports a write rejected by a unique index as a validation error on
/// `field`. Duplicate checks run before the write, so this only fires when a
/// concurrent request inserted the same key in between.
pub fn unique_violation_error(err: DbErr, field: &str, message: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            warn!(field, %detail, "Write rejected by unique index");
            ServiceError::invalid_field(field, message)
        }
        _ => ServiceError::DatabaseError(err),
    }
}
