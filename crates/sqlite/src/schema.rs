//! Schema bootstrap for the SQLite backend.
//!
//! Tables keep the column names the scanner firmware and dashboards already
//! read (`rfid_data`, `rfid_status`, `time_log`).
//!
//! - Version 1: `rfid_reg`, `rfid_logs`

use sqlx::SqlitePool;
use tracing::debug;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE TABLE IF NOT EXISTS rfid_reg (
        rfid_data TEXT PRIMARY KEY NOT NULL,
        rfid_status INTEGER NOT NULL DEFAULT 0 CHECK (rfid_status IN (0, 1))
    )",
    "CREATE TABLE IF NOT EXISTS rfid_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        time_log TEXT NOT NULL,
        rfid_data TEXT NOT NULL,
        rfid_status INTEGER NOT NULL CHECK (rfid_status IN (0, 1))
    )",
    "CREATE INDEX IF NOT EXISTS idx_rfid_logs_time ON rfid_logs(time_log)",
    "INSERT OR IGNORE INTO schema_version (version) VALUES (1)",
];

/// Create all tables if missing. Safe to run on every startup.
pub(crate) async fn initialize(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    let version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await?;

    debug!("Database schema at version {}", version);
    Ok(version)
}
