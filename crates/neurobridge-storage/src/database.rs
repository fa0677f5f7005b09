// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and
//! write transactions.
//!
//! Writes run on a single tokio-rusqlite connection. It sits behind an
//! async mutex so that a [`Tx`] owns it for the whole transaction: no other
//! task can interleave statements between `BEGIN IMMEDIATE` and `COMMIT`.
//! Do NOT open additional connections for writes.
//!
//! File databases in WAL mode also get a small pool of `query_only` reader
//! connections. [`Executor::query`] on a [`Database`] runs there, so reads
//! keep going while a long transaction holds the writer.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use neurobridge_config::model::StorageConfig;
use neurobridge_core::NeuroError;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::migrations;

/// Anything that can run a closure against the SQLite connection.
///
/// Implemented by [`Database`] (autocommit, one statement batch per call)
/// and [`Tx`] (inside an open write transaction). Query modules are
/// generic over it so the same function serves both.
pub trait Executor: Send + Sync {
    fn call<F, R>(&self, f: F) -> impl Future<Output = Result<R, NeuroError>> + Send
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static;

    /// Run a read-only closure.
    ///
    /// Inside a [`Tx`] this is the transaction's own connection, so reads see
    /// uncommitted writes. On a [`Database`] it may use a reader connection
    /// that only sees committed data and rejects writes.
    fn query<F, R>(&self, f: F) -> impl Future<Output = Result<R, NeuroError>> + Send
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.call(f)
    }
}

/// Reader connections used by [`Database`] outside transactions.
const READ_POOL_SIZE: usize = 4;

struct Slot {
    conn: Connection,
    /// Set between `BEGIN` and `COMMIT`/`ROLLBACK`.
    in_tx: bool,
}

/// Round-robin set of `query_only` connections. Empty for in-memory and
/// non-WAL databases, where reads share the writer.
#[derive(Default)]
struct ReadPool {
    conns: Vec<Connection>,
    next: AtomicUsize,
}

impl ReadPool {
    async fn open(path: &std::path::Path, size: usize) -> Result<Self, NeuroError> {
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open(path).await.map_err(|e| map_tr_err(e.into()))?;
            conn.call(|conn| {
                conn.execute_batch("PRAGMA query_only = ON; PRAGMA foreign_keys = ON;")?;
                conn.busy_timeout(std::time::Duration::from_secs(5))
            })
            .await
            .map_err(map_tr_err)?;
            conns.push(conn);
        }
        Ok(Self {
            conns,
            next: AtomicUsize::new(0),
        })
    }

    fn pick(&self) -> Option<&Connection> {
        if self.conns.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        self.conns.get(i)
    }
}

/// Shared handle to the NeuroBridge SQLite database.
#[derive(Clone)]
pub struct Database {
    slot: Arc<Mutex<Slot>>,
    readers: Arc<ReadPool>,
}

impl Database {
    /// Open (or create) a database file, apply PRAGMAs and run migrations.
    pub async fn open(path: &str) -> Result<Self, NeuroError> {
        Self::open_with(&StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        })
        .await
    }

    pub async fn open_with(config: &StorageConfig) -> Result<Self, NeuroError> {
        let path = std::path::Path::new(&config.database_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(NeuroError::storage)?;
        }

        let conn = Connection::open(path).await.map_err(|e| map_tr_err(e.into()))?;
        let mut db = Self::init(conn, config.wal_mode).await?;
        // Readers open after migrations so they never see a partial schema.
        if config.wal_mode {
            db.readers = Arc::new(ReadPool::open(path, READ_POOL_SIZE).await?);
        }
        info!(
            path = %config.database_path,
            wal = config.wal_mode,
            readers = db.readers.conns.len(),
            "database opened"
        );
        Ok(db)
    }

    /// In-memory database with the full schema, for tests.
    pub async fn open_in_memory() -> Result<Self, NeuroError> {
        let conn = Connection::open_in_memory().await.map_err(|e| map_tr_err(e.into()))?;
        Self::init(conn, false).await
    }

    async fn init(conn: Connection, wal_mode: bool) -> Result<Self, NeuroError> {
        conn.call(move |conn| {
            if wal_mode {
                conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        let applied = conn
            .call(|conn| Ok::<_, rusqlite::Error>(migrations::run_migrations(conn)))
            .await
            .map_err(map_tr_err)??;
        if applied > 0 {
            info!(applied, "applied database migrations");
        }

        Ok(Self {
            slot: Arc::new(Mutex::new(Slot { conn, in_tx: false })),
            readers: Arc::new(ReadPool::default()),
        })
    }

    /// Start a write transaction.
    ///
    /// `BEGIN IMMEDIATE` takes SQLite's reserved lock up front, so every
    /// read-modify-write inside the returned [`Tx`] is serialized against
    /// all other writers (the equivalent of `SELECT ... FOR UPDATE`).
    pub async fn begin(&self) -> Result<Tx, NeuroError> {
        let mut slot = self.acquire().await?;
        // Flag first: a future dropped mid-BEGIN must still be rolled back.
        slot.in_tx = true;
        run(&slot.conn, |c| c.execute_batch("BEGIN IMMEDIATE")).await?;
        Ok(Tx {
            slot,
            finished: false,
        })
    }

    /// Lock the connection, rolling back anything a dropped [`Tx`] left open.
    async fn acquire(&self) -> Result<OwnedMutexGuard<Slot>, NeuroError> {
        let mut slot = self.slot.clone().lock_owned().await;
        if slot.in_tx {
            let rolled_back = run(&slot.conn, |c| {
                if c.is_autocommit() {
                    Ok(false)
                } else {
                    c.execute_batch("ROLLBACK")?;
                    Ok(true)
                }
            })
            .await?;
            slot.in_tx = false;
            if rolled_back {
                warn!("rolled back transaction abandoned before commit");
            }
        }
        Ok(slot)
    }

    /// Close the underlying connections if this is the last handle.
    pub async fn close(self) -> Result<(), NeuroError> {
        if let Ok(pool) = Arc::try_unwrap(self.readers) {
            for conn in pool.conns {
                conn.close().await.map_err(map_tr_err)?;
            }
        }
        match Arc::try_unwrap(self.slot) {
            Ok(mutex) => {
                mutex.into_inner().conn.close().await.map_err(map_tr_err)?;
                debug!("database closed");
                Ok(())
            }
            Err(_) => {
                debug!("database still shared, leaving connection open");
                Ok(())
            }
        }
    }
}

impl Executor for Database {
    async fn call<F, R>(&self, f: F) -> Result<R, NeuroError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let slot = self.acquire().await?;
        run(&slot.conn, f).await
    }

    async fn query<F, R>(&self, f: F) -> Result<R, NeuroError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        match self.readers.pick() {
            Some(reader) => run(reader, f).await,
            None => self.call(f).await,
        }
    }
}

/// An open write transaction holding exclusive use of the connection.
///
/// Consumed by [`Tx::commit`] or [`Tx::rollback`]. Dropping it without
/// either (error path, cancelled future) discards its writes: the next
/// caller to acquire the connection issues the `ROLLBACK`.
pub struct Tx {
    slot: OwnedMutexGuard<Slot>,
    finished: bool,
}

impl Tx {
    pub async fn commit(mut self) -> Result<(), NeuroError> {
        run(&self.slot.conn, |c| c.execute_batch("COMMIT")).await?;
        self.slot.in_tx = false;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), NeuroError> {
        run(&self.slot.conn, |c| c.execute_batch("ROLLBACK")).await?;
        self.slot.in_tx = false;
        self.finished = true;
        Ok(())
    }
}

impl Executor for Tx {
    async fn call<F, R>(&self, f: F) -> Result<R, NeuroError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        run(&self.slot.conn, f).await
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if !self.finished {
            debug!("transaction dropped without commit");
        }
    }
}

/// Run `f` on the background thread and map its own error separately from
/// connection-level failures.
async fn run<F, R>(conn: &Connection, f: F) -> Result<R, NeuroError>
where
    F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
{
    conn.call(move |c| Ok::<_, rusqlite::Error>(f(c)))
        .await
        .map_err(map_tr_err)?
        .map_err(map_sqlite_err)
}

/// Map a tokio-rusqlite transport error (closed connection, etc.).
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> NeuroError {
    NeuroError::Storage {
        source: Box::new(e),
    }
}

/// Map a rusqlite error, turning unique/primary-key violations into conflicts.
pub fn map_sqlite_err(e: rusqlite::Error) -> NeuroError {
    if let rusqlite::Error::SqliteFailure(err, message) = &e
        && err.code == rusqlite::ErrorCode::ConstraintViolation
        && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    {
        return NeuroError::Conflict(message.clone().unwrap_or_else(|| e.to_string()));
    }
    NeuroError::storage(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(db: &Database) -> i64 {
        db.call(|c| c.query_row("SELECT COUNT(*) FROM material_sets", [], |r| r.get(0)))
            .await
            .unwrap()
    }

    async fn seed_user(db: &Database) {
        db.call(|c| {
            c.execute(
                "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at, updated_at)
                 VALUES ('u1', 'a@b.c', 'x', 'A', 'B', 't', 't')",
                [],
            )
        })
        .await
        .unwrap();
    }

    fn insert_set(id: &'static str) -> impl FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<usize> {
        move |c| {
            c.execute(
                "INSERT INTO material_sets (id, user_id, status, created_at, updated_at)
                 VALUES (?1, 'u1', 'pending', 't', 't')",
                [id],
            )
        }
    }

    #[tokio::test]
    async fn open_file_database_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/nb.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        let mode: String = db
            .call(|c| c.query_row("PRAGMA journal_mode", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let fk: i64 = db
            .call(|c| c.query_row("PRAGMA foreign_keys", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(fk, 1);
        db.close().await.unwrap();

        // Re-opening applies nothing new and keeps data.
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db).await;
        let tx = db.begin().await.unwrap();
        tx.call(insert_set("s1")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db).await;
        let tx = db.begin().await.unwrap();
        tx.call(insert_set("s1")).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn dropped_transaction_is_rolled_back() {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db).await;
        {
            let tx = db.begin().await.unwrap();
            tx.call(insert_set("s1")).await.unwrap();
        }
        assert_eq!(count(&db).await, 0);

        // The connection is usable for a fresh transaction afterwards.
        let tx = db.begin().await.unwrap();
        tx.call(insert_set("s2")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn unique_violation_maps_to_conflict() {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db).await;
        let err = db
            .call(|c| {
                c.execute(
                    "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at, updated_at)
                     VALUES ('u2', 'a@b.c', 'x', 'A', 'B', 't', 't')",
                    [],
                )
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NeuroError::Conflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn reads_proceed_while_a_transaction_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("nb.db").to_str().unwrap())
            .await
            .unwrap();
        seed_user(&db).await;

        let tx = db.begin().await.unwrap();
        tx.call(insert_set("s1")).await.unwrap();

        // The writer is held by `tx`; a read must not queue behind it.
        let read = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            db.query(|c| c.query_row("SELECT COUNT(*) FROM users", [], |r| r.get::<_, i64>(0))),
        )
        .await
        .expect("read blocked behind the open transaction")
        .unwrap();
        assert_eq!(read, 1);

        // Uncommitted rows are invisible to readers but visible to the tx.
        let outside: i64 = db
            .query(|c| c.query_row("SELECT COUNT(*) FROM material_sets", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(outside, 0);
        let inside: i64 = tx
            .query(|c| c.query_row("SELECT COUNT(*) FROM material_sets", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(inside, 1);

        tx.commit().await.unwrap();
        let after: i64 = db
            .query(|c| c.query_row("SELECT COUNT(*) FROM material_sets", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(after, 1);
    }

    #[tokio::test]
    async fn reader_connections_reject_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("nb.db").to_str().unwrap())
            .await
            .unwrap();
        seed_user(&db).await;
        assert!(db.query(insert_set("s1")).await.is_err());
        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn in_memory_reads_share_the_writer() {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db).await;
        db.query(insert_set("s1")).await.unwrap();
        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn transactions_serialize_callers() {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db).await;
        let tx = db.begin().await.unwrap();

        let db2 = db.clone();
        let waiter = tokio::spawn(async move {
            let tx = db2.begin().await.unwrap();
            let n: i64 = tx
                .call(|c| c.query_row("SELECT COUNT(*) FROM material_sets", [], |r| r.get(0)))
                .await
                .unwrap();
            tx.commit().await.unwrap();
            n
        });

        tokio::task::yield_now().await;
        tx.call(insert_set("s1")).await.unwrap();
        tx.commit().await.unwrap();

        // The second transaction only starts after the first committed.
        assert_eq!(waiter.await.unwrap(), 1);
    }
}
