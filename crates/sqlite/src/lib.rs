//! SQLite backend for `GateStorage`, built on a `sqlx` connection pool.
//!
//! Each snapshot owns a pooled connection for the lifetime of its
//! transaction. Dropping a snapshot without committing rolls it back and
//! returns the connection to the pool.
//!
//! File databases run in WAL mode so readers outside a snapshot never block
//! on, or observe, an open write transaction.

mod schema;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rfidgate_storage::{
    GateStorage, LogEntryRecord, NewLogEntry, StorageError, TagRecord, TagStatus,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::info;

/// How long a writer waits for the database lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Primary SQLite result code for a locked database (`SQLITE_BUSY`).
const SQLITE_BUSY: i64 = 5;

/// `GateStorage` over a SQLite database.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

/// An open SQLite transaction.
pub struct SqliteSnapshot {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteStorage {
    /// Connect to a database URL such as `sqlite://rfidgate.db`, creating the
    /// file and schema if missing.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url).map_err(backend)?;
        Self::connect_with(options, max_connections).await
    }

    /// Open a database file by path, creating the file and schema if missing.
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self, StorageError> {
        Self::connect_with(SqliteConnectOptions::new().filename(path), max_connections).await
    }

    async fn connect_with(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, StorageError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(backend)?;

        let version = schema::initialize(&pool).await.map_err(backend)?;
        info!(
            "SQLite storage ready (schema version {}, pool size {})",
            version,
            max_connections.max(1)
        );

        Ok(Self { pool })
    }

    /// Close every pooled connection. Pending snapshots are rolled back.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// True when SQLite refused the write because another connection holds the
/// lock or committed first (`SQLITE_BUSY` and its extended codes).
fn is_busy(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|c| c.parse::<i64>().ok())
            .is_some_and(|code| code & 0xff == SQLITE_BUSY),
        _ => false,
    }
}

/// Map a write failure on `tag_id`, reporting lock contention as a conflict.
fn write_err(tag_id: &str) -> impl FnOnce(sqlx::Error) -> StorageError + '_ {
    move |e| {
        if is_busy(&e) {
            StorageError::ConcurrentConflict {
                tag_id: tag_id.to_string(),
            }
        } else {
            backend(e)
        }
    }
}

fn decode_status(value: i64) -> Result<TagStatus, StorageError> {
    TagStatus::from_i64(value)
        .ok_or_else(|| StorageError::Backend(format!("invalid stored status {}", value)))
}

fn tag_from_row(row: &SqliteRow) -> Result<TagRecord, StorageError> {
    Ok(TagRecord {
        tag_id: row.try_get("rfid_data").map_err(backend)?,
        status: decode_status(row.try_get("rfid_status").map_err(backend)?)?,
    })
}

fn log_from_row(row: &SqliteRow) -> Result<LogEntryRecord, StorageError> {
    Ok(LogEntryRecord {
        id: row.try_get("id").map_err(backend)?,
        timestamp: row.try_get("time_log").map_err(backend)?,
        tag_id: row.try_get("rfid_data").map_err(backend)?,
        status: decode_status(row.try_get("rfid_status").map_err(backend)?)?,
    })
}

#[async_trait]
impl GateStorage for SqliteStorage {
    type Snapshot = SqliteSnapshot;

    async fn begin_snapshot(&self) -> Result<SqliteSnapshot, StorageError> {
        let tx = self.pool.begin().await.map_err(backend)?;
        Ok(SqliteSnapshot { tx })
    }

    async fn commit_snapshot(&self, snapshot: SqliteSnapshot) -> Result<(), StorageError> {
        snapshot.tx.commit().await.map_err(backend)
    }

    async fn abort_snapshot(&self, snapshot: SqliteSnapshot) -> Result<(), StorageError> {
        snapshot.tx.rollback().await.map_err(backend)
    }

    async fn register_tag(
        &self,
        snapshot: &mut SqliteSnapshot,
        tag_id: &str,
        status: TagStatus,
    ) -> Result<(), StorageError> {
        let result = sqlx::query("INSERT INTO rfid_reg (rfid_data, rfid_status) VALUES (?, ?)")
            .bind(tag_id)
            .bind(status.as_i64())
            .execute(&mut *snapshot.tx)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::AlreadyRegistered {
                    tag_id: tag_id.to_string(),
                })
            }
            Err(e) => Err(write_err(tag_id)(e)),
        }
    }

    async fn lookup_status_for_update(
        &self,
        snapshot: &mut SqliteSnapshot,
        tag_id: &str,
    ) -> Result<Option<TagStatus>, StorageError> {
        // SQLite has no SELECT ... FOR UPDATE. A no-op write takes the writer
        // lock before the read, so the read cannot go stale before our update.
        sqlx::query("UPDATE rfid_reg SET rfid_status = rfid_status WHERE rfid_data = ?")
            .bind(tag_id)
            .execute(&mut *snapshot.tx)
            .await
            .map_err(write_err(tag_id))?;

        let status: Option<i64> =
            sqlx::query_scalar("SELECT rfid_status FROM rfid_reg WHERE rfid_data = ?")
                .bind(tag_id)
                .fetch_optional(&mut *snapshot.tx)
                .await
                .map_err(backend)?;

        status.map(decode_status).transpose()
    }

    async fn update_status(
        &self,
        snapshot: &mut SqliteSnapshot,
        tag_id: &str,
        expected: Option<TagStatus>,
        new_status: TagStatus,
    ) -> Result<u64, StorageError> {
        let Some(expected) = expected else {
            let result = sqlx::query("UPDATE rfid_reg SET rfid_status = ? WHERE rfid_data = ?")
                .bind(new_status.as_i64())
                .bind(tag_id)
                .execute(&mut *snapshot.tx)
                .await
                .map_err(write_err(tag_id))?;
            return Ok(result.rows_affected());
        };

        let result = sqlx::query(
            "UPDATE rfid_reg SET rfid_status = ? WHERE rfid_data = ? AND rfid_status = ?",
        )
        .bind(new_status.as_i64())
        .bind(tag_id)
        .bind(expected.as_i64())
        .execute(&mut *snapshot.tx)
        .await
        .map_err(write_err(tag_id))?;

        if result.rows_affected() > 0 {
            return Ok(result.rows_affected());
        }

        // Zero rows: either the tag is unknown or its status moved on.
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM rfid_reg WHERE rfid_data = ?")
            .bind(tag_id)
            .fetch_optional(&mut *snapshot.tx)
            .await
            .map_err(backend)?;

        match exists {
            Some(_) => Err(StorageError::ConcurrentConflict {
                tag_id: tag_id.to_string(),
            }),
            None => Ok(0),
        }
    }

    async fn append_log(
        &self,
        snapshot: &mut SqliteSnapshot,
        entry: NewLogEntry,
    ) -> Result<LogEntryRecord, StorageError> {
        let result = sqlx::query(
            "INSERT INTO rfid_logs (time_log, rfid_data, rfid_status) VALUES (?, ?, ?)",
        )
        .bind(&entry.timestamp)
        .bind(&entry.tag_id)
        .bind(entry.status.as_i64())
        .execute(&mut *snapshot.tx)
        .await
        .map_err(write_err(&entry.tag_id))?;

        Ok(LogEntryRecord::from_new(result.last_insert_rowid(), entry))
    }

    async fn get_tag(&self, tag_id: &str) -> Result<Option<TagRecord>, StorageError> {
        let row = sqlx::query("SELECT rfid_data, rfid_status FROM rfid_reg WHERE rfid_data = ?")
            .bind(tag_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(tag_from_row).transpose()
    }

    async fn list_tags(&self) -> Result<Vec<TagRecord>, StorageError> {
        let rows = sqlx::query("SELECT rfid_data, rfid_status FROM rfid_reg ORDER BY rfid_data")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(tag_from_row).collect()
    }

    async fn list_recent_logs(&self, limit: usize) -> Result<Vec<LogEntryRecord>, StorageError> {
        // LIMIT -1 is SQLite for "no limit".
        let limit = if limit == 0 {
            -1
        } else {
            i64::try_from(limit).unwrap_or(i64::MAX)
        };

        let rows = sqlx::query(
            "SELECT id, time_log, rfid_data, rfid_status FROM rfid_logs ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(log_from_row).collect()
    }
}
