use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, RuntimeErr};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// SQLite admits a single writer. Extra pooled connections only turn writers
/// on different items into `SQLITE_BUSY` failures.
const SQLITE_MAX_CONNECTIONS: u32 = 1;

/// Server messages for lock contention, for errors that arrive without a code.
const LOCK_CONTENTION_MESSAGES: [&str; 2] = ["database is locked", "database table is locked"];

pub fn is_sqlite_url(url: &str) -> bool {
    url.starts_with("sqlite:")
}

/// Whether a database error code means the statement lost a lock to another
/// writer and nothing was applied.
///
/// SQLite reports `SQLITE_BUSY` (5) and `SQLITE_LOCKED` (6), possibly as
/// extended codes of up to four digits. Postgres reports five-character
/// SQLSTATEs for serialization failures, deadlocks and `lock_not_available`.
pub fn is_contention_code(code: &str) -> bool {
    match code {
        "40001" | "40P01" | "55P03" => true,
        sqlite if sqlite.len() <= 4 => sqlite
            .parse::<i32>()
            .map(|extended| matches!(extended & 0xff, 5 | 6))
            .unwrap_or(false),
        _ => false,
    }
}

/// Whether `err` is lock contention that a retry can get past.
pub fn is_lock_contention(err: &DbErr) -> bool {
    if let DbErr::Conn(RuntimeErr::SqlxError(sqlx_err))
    | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err))
    | DbErr::Query(RuntimeErr::SqlxError(sqlx_err)) = err
    {
        if let Some(code) = sqlx_err.as_database_error().and_then(|db_err| db_err.code()) {
            return is_contention_code(&code);
        }
    }

    let message = err.to_string();
    LOCK_CONTENTION_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
}

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    /// Pool bounds actually used, after the SQLite single-writer cap.
    pub fn pool_bounds(&self) -> (u32, u32) {
        let max = if is_sqlite_url(&self.url) {
            self.max_connections.min(SQLITE_MAX_CONNECTIONS)
        } else {
            self.max_connections
        };
        (max, self.min_connections.min(max))
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections.min(cfg.db_max_connections),
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns `ServiceError::DatabaseError` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let (max_connections, min_connections) = config.pool_bounds();
    if max_connections < config.max_connections {
        info!(
            requested = config.max_connections,
            max_connections, "SQLite allows one writer; capping the connection pool"
        );
    }
    debug!(
        max_connections,
        min_connections, "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("stock_ledger_db.max_connections", max_connections as f64);

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Database connection establishment failed");
        counter!("stock_ledger_db.connection_failures", 1);
        ServiceError::db_error(e)
    })?;

    info!(max_connections, "Database connection pool established");
    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Runs the embedded schema migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| ServiceError::MigrationError(e.to_string()));

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(?elapsed, "Database migrations completed"),
        Err(e) => error!(?elapsed, error = %e, "Database migrations failed"),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let start = Instant::now();
    let result = pool.ping().await.map_err(ServiceError::db_error);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!(?elapsed, "Database connection check successful");
            histogram!("stock_ledger_db.ping.duration", elapsed);
        }
        Err(e) => {
            error!(?elapsed, error = %e, "Database connection check failed");
            counter!("stock_ledger_db.connection_failures", 1);
        }
    }

    result
}
