//! SQLite storage backend for vudata.

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use rusqlite::{
    params, Connection, ErrorCode, OpenFlags, OptionalExtension, Transaction, TransactionBehavior,
};
use vudata_core::{CollectionName, Family, QueueItem, StorageBackend, StorageError};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable store on a single SQLite database file.
///
/// Mutations go through one writer connection and run as `BEGIN IMMEDIATE`
/// transactions, so SQLite's database-wide write lock serializes them. File
/// databases get a second read-only connection for non-exclusive reads.
pub struct SqliteStorage {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
}

fn sql_err(e: rusqlite::Error) -> StorageError {
    match e {
        rusqlite::Error::SqliteFailure(ref f, _)
            if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StorageError::Busy
        }
        _ => StorageError::Other(e.to_string()),
    }
}

fn decode_err(family: Family, name: &CollectionName, e: rusqlite::Error) -> StorageError {
    match e {
        rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::FromSqlConversionFailure(..) => {
            StorageError::Corrupt {
                family,
                name: name.to_string(),
                reason: e.to_string(),
            }
        }
        _ => sql_err(e),
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StorageError> {
    conn.lock()
        .map_err(|_| StorageError::Other("sqlite connection lock poisoned".to_string()))
}

fn item_from_row(row: &rusqlite::Row) -> rusqlite::Result<QueueItem> {
    let position: i64 = row.get(0)?;
    Ok(QueueItem::new(position as u64, row.get::<_, String>(1)?))
}

fn queue_exists(conn: &Connection, name: &CollectionName) -> Result<bool, StorageError> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM queues WHERE name = ?1",
        params![name.as_str()],
        |row| row.get(0),
    )
    .map_err(sql_err)
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn with_busy_timeout(path: &str, busy_timeout: Duration) -> Result<Self, StorageError> {
        let in_memory = path == ":memory:";
        let conn = if in_memory {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(sql_err)?;

        conn.busy_timeout(busy_timeout).map_err(sql_err)?;
        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(sql_err)?;
        conn.pragma_update(None, "foreign_keys", true).map_err(sql_err)?;
        Self::init_schema(&conn)?;

        let reader = if in_memory {
            None
        } else {
            let reader = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(sql_err)?;
            reader.busy_timeout(busy_timeout).map_err(sql_err)?;
            Some(Mutex::new(reader))
        };

        tracing::debug!(path, in_memory, %journal_mode, "SQLite store opened");
        Ok(Self {
            writer: Mutex::new(conn),
            reader,
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL CHECK (value >= 0)
            ) WITHOUT ROWID;

            CREATE TABLE IF NOT EXISTS map_entries (
                name TEXT PRIMARY KEY,
                payload TEXT NOT NULL CHECK (json_valid(payload))
            ) WITHOUT ROWID;

            CREATE TABLE IF NOT EXISTS queues (
                name TEXT PRIMARY KEY,
                last_position INTEGER NOT NULL
            ) WITHOUT ROWID;

            CREATE TABLE IF NOT EXISTS queue_items (
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                payload TEXT NOT NULL CHECK (json_valid(payload)),
                PRIMARY KEY (name, position),
                FOREIGN KEY (name) REFERENCES queues(name)
            ) WITHOUT ROWID;
            ",
        )
        .map_err(sql_err)
    }

    /// Runs `f` inside one `BEGIN IMMEDIATE` transaction on the writer.
    /// Any error rolls the whole transaction back.
    fn exclusive<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut conn = lock(&self.writer)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_err)?;
        let out = f(&tx)?;
        tx.commit().map_err(sql_err)?;
        Ok(out)
    }

    /// Runs `f` inside a deferred read transaction, so multi-statement reads
    /// see one snapshot.
    fn snapshot<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let conn = match &self.reader {
            Some(reader) => lock(reader)?,
            None => lock(&self.writer)?,
        };
        let tx = conn.unchecked_transaction().map_err(sql_err)?;
        let out = f(&tx)?;
        tx.finish().map_err(sql_err)?;
        Ok(out)
    }
}

fn family_table(family: Family) -> &'static str {
    match family {
        Family::Counter => "counters",
        Family::Map => "map_entries",
        Family::Queue => "queues",
    }
}

impl StorageBackend for SqliteStorage {
    fn collection_exists(&self, family: Family, name: &CollectionName) -> Result<bool, StorageError> {
        let sql = format!("SELECT COUNT(*) > 0 FROM {} WHERE name = ?1", family_table(family));
        self.snapshot(|conn| {
            conn.query_row(&sql, params![name.as_str()], |row| row.get(0))
                .map_err(sql_err)
        })
    }

    fn list_collections(&self, family: Family) -> Result<Vec<String>, StorageError> {
        let sql = format!("SELECT name FROM {} ORDER BY name", family_table(family));
        self.snapshot(|conn| {
            let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sql_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sql_err)?;
            Ok(rows)
        })
    }

    fn set_counter(&self, name: &CollectionName, value: i64) -> Result<(), StorageError> {
        self.exclusive(|tx| {
            tx.execute(
                "INSERT INTO counters (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![name.as_str(), value],
            )
            .map_err(sql_err)?;
            Ok(())
        })
    }

    fn increment_counter(&self, name: &CollectionName) -> Result<i64, StorageError> {
        self.exclusive(|tx| {
            let current: Option<i64> = tx
                .query_row(
                    "SELECT value FROM counters WHERE name = ?1",
                    params![name.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| decode_err(Family::Counter, name, e))?;

            let next = current
                .unwrap_or(0)
                .checked_add(1)
                .ok_or_else(|| StorageError::Overflow(name.to_string()))?;

            tx.execute(
                "INSERT INTO counters (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![name.as_str(), next],
            )
            .map_err(sql_err)?;
            Ok(next)
        })
    }

    fn delete_counter(&self, name: &CollectionName) -> Result<(), StorageError> {
        self.exclusive(|tx| {
            tx.execute("DELETE FROM counters WHERE name = ?1", params![name.as_str()])
                .map_err(sql_err)?;
            Ok(())
        })
    }

    fn put_entry(&self, name: &CollectionName, payload: &str) -> Result<(), StorageError> {
        let conn = lock(&self.writer)?;
        conn.execute(
            "INSERT INTO map_entries (name, payload) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET payload = excluded.payload",
            params![name.as_str(), payload],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    fn get_entry(&self, name: &CollectionName) -> Result<Option<String>, StorageError> {
        self.snapshot(|conn| {
            conn.query_row(
                "SELECT payload FROM map_entries WHERE name = ?1",
                params![name.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| decode_err(Family::Map, name, e))
        })
    }

    fn delete_entry(&self, name: &CollectionName) -> Result<(), StorageError> {
        let conn = lock(&self.writer)?;
        conn.execute("DELETE FROM map_entries WHERE name = ?1", params![name.as_str()])
            .map_err(sql_err)?;
        Ok(())
    }

    fn push_items(&self, name: &CollectionName, payloads: &[String]) -> Result<Vec<QueueItem>, StorageError> {
        self.exclusive(|tx| {
            tx.execute(
                "INSERT INTO queues (name, last_position) VALUES (?1, 0)
                 ON CONFLICT(name) DO NOTHING",
                params![name.as_str()],
            )
            .map_err(sql_err)?;

            let mut last_position: i64 = tx
                .query_row(
                    "SELECT last_position FROM queues WHERE name = ?1",
                    params![name.as_str()],
                    |row| row.get(0),
                )
                .map_err(|e| decode_err(Family::Queue, name, e))?;

            let mut pushed = Vec::with_capacity(payloads.len());
            {
                let mut stmt = tx
                    .prepare_cached(
                        "INSERT INTO queue_items (name, position, payload) VALUES (?1, ?2, ?3)",
                    )
                    .map_err(sql_err)?;
                for payload in payloads {
                    last_position += 1;
                    stmt.execute(params![name.as_str(), last_position, payload])
                        .map_err(sql_err)?;
                    pushed.push(QueueItem::new(last_position as u64, payload.as_str()));
                }
            }

            tx.execute(
                "UPDATE queues SET last_position = ?2 WHERE name = ?1",
                params![name.as_str(), last_position],
            )
            .map_err(sql_err)?;

            tracing::trace!(queue = %name, count = pushed.len(), last_position, "items pushed");
            Ok(pushed)
        })
    }

    fn pop_items(
        &self,
        name: &CollectionName,
        limit: usize,
        check: &mut dyn FnMut(&QueueItem) -> Result<(), StorageError>,
    ) -> Result<Option<Vec<QueueItem>>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.exclusive(|tx| {
            if !queue_exists(tx, name)? {
                return Ok(None);
            }

            // Selection and removal are one statement: no other writer can
            // interleave between choosing the rows and deleting them.
            let mut stmt = tx
                .prepare_cached(
                    "DELETE FROM queue_items
                     WHERE name = ?1 AND position IN (
                         SELECT position FROM queue_items
                         WHERE name = ?1
                         ORDER BY position
                         LIMIT ?2
                     )
                     RETURNING position, payload",
                )
                .map_err(sql_err)?;
            let mut items = stmt
                .query_map(params![name.as_str(), limit], item_from_row)
                .map_err(sql_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| decode_err(Family::Queue, name, e))?;

            // RETURNING order is unspecified.
            items.sort_by_key(|item| item.position);

            // Still uncommitted: a failed check rolls the delete back.
            for item in &items {
                check(item)?;
            }
            Ok(Some(items))
        })
    }

    fn peek_item(&self, name: &CollectionName) -> Result<Option<Option<QueueItem>>, StorageError> {
        self.snapshot(|conn| {
            if !queue_exists(conn, name)? {
                return Ok(None);
            }
            let head = conn
                .query_row(
                    "SELECT position, payload FROM queue_items
                     WHERE name = ?1 ORDER BY position LIMIT 1",
                    params![name.as_str()],
                    item_from_row,
                )
                .optional()
                .map_err(|e| decode_err(Family::Queue, name, e))?;
            Ok(Some(head))
        })
    }

    fn queue_depth(&self, name: &CollectionName) -> Result<Option<u64>, StorageError> {
        self.snapshot(|conn| {
            if !queue_exists(conn, name)? {
                return Ok(None);
            }
            let depth: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM queue_items WHERE name = ?1",
                    params![name.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql_err)?;
            Ok(Some(depth as u64))
        })
    }

    fn drop_queue(&self, name: &CollectionName) -> Result<(), StorageError> {
        self.exclusive(|tx| {
            tx.execute("DELETE FROM queue_items WHERE name = ?1", params![name.as_str()])
                .map_err(sql_err)?;
            let removed = tx
                .execute("DELETE FROM queues WHERE name = ?1", params![name.as_str()])
                .map_err(sql_err)?;
            tracing::trace!(queue = %name, existed = removed > 0, "queue dropped");
            Ok(())
        })
    }
}
