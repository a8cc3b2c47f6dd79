//! SQLite connection pool, schema and transaction plumbing.
//!
//! ## Error classification
//!
//! Every store module maps SQLx errors through [`classify`]:
//!
//! | SQLite result code | Class | Scenario |
//! |--------------------|-------|----------|
//! | `5`, `261`, `517` (`SQLITE_BUSY*`) | `Busy` | Writer lock not obtained before the busy timeout |
//! | `6`, `262` (`SQLITE_LOCKED*`) | `Busy` | Table locked by another connection on a shared cache |
//! | `2067`, `1555` (unique / primary key) | `Unique` | Duplicate name or email |
//! | `787` (foreign key) | `ForeignKey` | Row still referenced, or reference to a missing row |
//! | `275` (check) | `Check` | Negative stock or non-positive price reached storage |
//! | anything else, pool errors, I/O | `Other` | Infrastructure failure |
//!
//! `PoolTimedOut` is classed as `Busy`: every pooled connection was held by
//! another writer for the whole acquire timeout.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, StoreConfig};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ingredients (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT    NOT NULL,
    kind      TEXT    NOT NULL,
    unit      TEXT    NOT NULL,
    quantity  REAL    NOT NULL CHECK (quantity >= 0),
    UNIQUE (name, kind)
);

CREATE TABLE IF NOT EXISTS menus (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT    NOT NULL UNIQUE,
    description  TEXT    NOT NULL,
    price_cents  INTEGER NOT NULL CHECK (price_cents > 0)
);

CREATE TABLE IF NOT EXISTS menu_recipes (
    menu_id        INTEGER NOT NULL REFERENCES menus(id) ON DELETE CASCADE,
    ingredient_id  INTEGER NOT NULL REFERENCES ingredients(id) ON DELETE CASCADE,
    quantity       REAL    NOT NULL CHECK (quantity > 0),
    PRIMARY KEY (menu_id, ingredient_id)
);

CREATE TABLE IF NOT EXISTS clients (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    name   TEXT NOT NULL,
    email  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS orders (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id      INTEGER NOT NULL REFERENCES clients(id) ON DELETE RESTRICT,
    created_at_ms  INTEGER NOT NULL,
    total_cents    INTEGER NOT NULL CHECK (total_cents >= 0),
    tax_rate_bps   INTEGER NOT NULL,
    description    TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_client ON orders (client_id);
CREATE INDEX IF NOT EXISTS idx_orders_created ON orders (created_at_ms);

CREATE TABLE IF NOT EXISTS order_lines (
    order_id          INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
    menu_id           INTEGER NOT NULL REFERENCES menus(id) ON DELETE RESTRICT,
    quantity          INTEGER NOT NULL CHECK (quantity >= 1),
    unit_price_cents  INTEGER NOT NULL,
    PRIMARY KEY (order_id, menu_id)
);

CREATE INDEX IF NOT EXISTS idx_order_lines_menu ON order_lines (menu_id);

CREATE TABLE IF NOT EXISTS stock_movements (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    ingredient_id  INTEGER NOT NULL REFERENCES ingredients(id) ON DELETE CASCADE,
    order_id       INTEGER NULL REFERENCES orders(id) ON DELETE SET NULL,
    reason         TEXT    NOT NULL,
    delta          REAL    NOT NULL,
    created_at_ms  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stock_movements_ingredient ON stock_movements (ingredient_id);
"#;

/// Failures opening the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid database url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("failed to create schema: {0}")]
    Schema(String),
}

/// Handle to the SQLite store. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    config: StoreConfig,
}

impl Store {
    /// Open the pool described by `config` and create the schema if needed.
    #[instrument(skip(config), fields(url = %config.database_url, max_connections = config.max_connections), err)]
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let in_memory = config.database_url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| StoreError::InvalidUrl {
                url: config.database_url.clone(),
                message: e.to_string(),
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if in_memory {
            // The database lives only as long as its connection.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connect {
                url: config.database_url.clone(),
                message: e.to_string(),
            })?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        info!("store ready");
        Ok(Self { pool, config })
    }

    /// Connect using `COMANDA_*` environment variables.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::connect(StoreConfig::from_env()?).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Write transaction that takes the database write lock on `BEGIN`.
///
/// `BEGIN IMMEDIATE` serializes writers up front, so whatever is read inside
/// the transaction cannot change until it ends. Dropping an open transaction
/// closes its connection, which makes SQLite roll it back.
pub(crate) struct WriteTx {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl WriteTx {
    pub(crate) async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn, open: true })
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub(crate) async fn commit(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }

    pub(crate) async fn rollback(mut self) {
        match sqlx::query("ROLLBACK").execute(&mut *self.conn).await {
            Ok(_) => self.open = false,
            Err(e) => warn!(error = %e, "rollback failed; discarding connection"),
        }
    }

    /// Commit on `Ok`, roll back on `Err`.
    pub(crate) async fn finish<T, E>(
        self,
        result: Result<T, E>,
        map_err: impl FnOnce(sqlx::Error) -> E,
    ) -> Result<T, E> {
        match result {
            Ok(value) => {
                self.commit().await.map_err(map_err)?;
                Ok(value)
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        if self.open {
            debug!("write transaction dropped while open");
            self.conn.close_on_drop();
        }
    }
}

/// Class of a SQLx failure, see the module docs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SqlFailure {
    Busy(String),
    Unique(String),
    ForeignKey(String),
    Check(String),
    Other(String),
}

pub(crate) fn classify(operation: &str, err: &sqlx::Error) -> SqlFailure {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            let code = db_err.code();
            match code.as_deref() {
                Some("5" | "6" | "261" | "262" | "517") => SqlFailure::Busy(msg),
                _ if db_err.is_unique_violation() => SqlFailure::Unique(msg),
                _ if db_err.is_foreign_key_violation() => SqlFailure::ForeignKey(msg),
                _ if db_err.is_check_violation() => SqlFailure::Check(msg),
                _ => SqlFailure::Other(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            SqlFailure::Busy(format!("timed out acquiring a connection in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            SqlFailure::Other(format!("connection pool closed in {operation}"))
        }
        other => SqlFailure::Other(format!("sqlx error in {operation}: {other}")),
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Decode a stored epoch-millisecond timestamp.
pub(crate) fn timestamp_from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}
