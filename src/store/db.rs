use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use super::retry::{RetryPolicy, is_busy};
use crate::error::{Error, Result};

const MAX_IDLE_READERS: usize = 4;

/// One SQLite file in WAL mode: a single writer connection plus a small pool
/// of read-only connections so readers never queue behind the writer mutex.
pub struct Database {
    path: PathBuf,
    label: String,
    busy_timeout: Duration,
    retry: RetryPolicy,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
}

impl Database {
    /// Opens (creating if needed) the file and applies pragmas. Lock
    /// contention is reported as `Busy`; any other failure, including a
    /// corrupt file, as `Unavailable`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        label: &str,
        busy_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let failed = |e: rusqlite::Error| open_error(label, e);

        let conn = Connection::open(&path).map_err(failed)?;
        conn.busy_timeout(busy_timeout).map_err(failed)?;
        register_functions(&conn).map_err(failed)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(failed)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(failed)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(failed)?;

        Ok(Self {
            path,
            label: label.to_string(),
            busy_timeout,
            retry,
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs schema DDL in one `BEGIN IMMEDIATE` transaction, so concurrent
    /// openers inspect and alter the schema one at a time.
    pub fn provision(&self, f: impl FnOnce(&Connection) -> Result<()>) -> Result<()> {
        self.write(f).map_err(|e| match e {
            Error::Database(inner) => open_error(&self.label, inner),
            other => other,
        })
    }

    fn writer_conn(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open_reader(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        register_functions(&conn)?;
        Ok(conn)
    }

    /// Runs `f` on a pooled read connection. Readers see the last committed
    /// snapshot and never wait for an in-flight write.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let pooled = self
            .readers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => self.open_reader()?,
        };

        let result = f(&conn);

        let mut idle = self.readers.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
        result
    }

    /// Runs `f` inside one `BEGIN IMMEDIATE` transaction. Commits on `Ok`,
    /// rolls back on `Err`. Lock contention is retried with backoff and
    /// surfaces as `Busy` once the attempt budget is spent.
    pub fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.writer_conn();
        self.begin_immediate(&conn)?;

        match f(&conn) {
            Ok(value) => match conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    rollback(&conn, &self.label);
                    if is_busy(&e) {
                        Err(Error::Busy { attempts: 1 })
                    } else {
                        Err(e.into())
                    }
                }
            },
            Err(e) => {
                rollback(&conn, &self.label);
                Err(e)
            }
        }
    }

    fn begin_immediate(&self, conn: &Connection) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match conn.execute_batch("BEGIN IMMEDIATE") {
                Ok(()) => return Ok(()),
                Err(e) if is_busy(&e) && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        storage = %self.label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "write lock busy, backing off"
                    );
                    thread::sleep(delay);
                }
                Err(e) if is_busy(&e) => {
                    warn!(storage = %self.label, attempts = attempt, "write lock not acquired");
                    return Err(Error::Busy { attempts: attempt });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn open_error(label: &str, e: rusqlite::Error) -> Error {
    if is_busy(&e) {
        Error::Busy { attempts: 1 }
    } else {
        Error::Unavailable {
            storage: label.to_string(),
            reason: e.to_string(),
        }
    }
}

/// SQL helpers every connection carries. `fold(text)` lowercases with full
/// Unicode rules; the builtin `lower()` and `LIKE` only fold ASCII.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

fn rollback(conn: &Connection, label: &str) {
    if let Err(e) = conn.execute_batch("ROLLBACK") {
        warn!(storage = %label, "rollback failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(path: &Path, attempts: u32) -> Database {
        let retry = RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        Database::open(path, "test", Duration::from_millis(1), retry).unwrap()
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let temp = TempDir::new().unwrap();
        let db = open(&temp.path().join("t.db"), 3);
        db.provision(|conn| {
            conn.execute_batch("CREATE TABLE items (v INTEGER)")?;
            Ok(())
        })
        .unwrap();

        let result: Result<()> = db.write(|conn| {
            conn.execute("INSERT INTO items (v) VALUES (1)", [])?;
            Err(Error::validation("v", "forced failure"))
        });
        assert!(result.is_err());

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_contended_write_reports_busy() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.db");
        let db = open(&path, 2);
        db.provision(|conn| {
            conn.execute_batch("CREATE TABLE items (v INTEGER)")?;
            Ok(())
        })
        .unwrap();

        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN IMMEDIATE").unwrap();

        let result = db.write(|conn| {
            conn.execute("INSERT INTO items (v) VALUES (1)", [])?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::Busy { attempts: 2 })));

        other.execute_batch("ROLLBACK").unwrap();
        assert!(db
            .write(|conn| {
                conn.execute("INSERT INTO items (v) VALUES (1)", [])?;
                Ok(())
            })
            .is_ok());
    }

    #[test]
    fn test_fold_lowercases_unicode_on_every_connection() {
        let temp = TempDir::new().unwrap();
        let db = open(&temp.path().join("t.db"), 2);
        db.provision(|conn| {
            conn.execute_batch("CREATE TABLE items (v TEXT)")?;
            Ok(())
        })
        .unwrap();

        let written: String = db
            .write(|conn| Ok(conn.query_row("SELECT fold('ÉCOLE Straße')", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(written, "école straße");

        let read: Option<String> = db
            .read(|conn| Ok(conn.query_row("SELECT fold(NULL)", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(read, None);
    }

    #[test]
    fn test_open_against_locked_file_reports_busy() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.db");
        let other = Connection::open(&path).unwrap();
        other
            .execute_batch("CREATE TABLE items (v INTEGER); BEGIN EXCLUSIVE;")
            .unwrap();

        let retry = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };
        let result = Database::open(&path, "test", Duration::from_millis(20), retry);
        assert!(matches!(result, Err(Error::Busy { .. })));

        other.execute_batch("ROLLBACK").unwrap();
    }

    #[test]
    fn test_reads_do_not_wait_for_open_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.db");
        let db = open(&path, 2);
        db.provision(|conn| {
            conn.execute_batch("CREATE TABLE items (v INTEGER); INSERT INTO items VALUES (7);")?;
            Ok(())
        })
        .unwrap();

        let other = Connection::open(&path).unwrap();
        other
            .execute_batch("BEGIN IMMEDIATE; INSERT INTO items VALUES (8);")
            .unwrap();

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);

        other.execute_batch("COMMIT").unwrap();
    }
}
