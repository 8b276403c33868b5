//! Connection source shared by every resource operation
//!
//! Connections are opened on demand and kept idle up to a fixed count. Each
//! store operation checks one out for its own duration only.

use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

use crate::{Error, Result};

/// Default number of idle connections kept around.
pub const DEFAULT_POOL_SIZE: usize = 8;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MEMORY_DATABASES: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone)]
enum Target {
    File(PathBuf),
    /// Shared-cache in-memory database, alive while any connection is open
    Memory(String),
}

/// Pool of SQLite connections to one database.
pub struct ConnectionPool {
    target: Target,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
    /// Keeps an in-memory database alive between checkouts
    _anchor: Option<Mutex<Connection>>,
}

impl ConnectionPool {
    /// Pool over a database file (creates it, and its directory, if needed).
    pub fn open(path: &Path, max_idle: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Construction(format!("could not create {}: {}", parent.display(), e))
                })?;
            }
        }
        let pool = Self {
            target: Target::File(path.to_path_buf()),
            idle: Mutex::new(Vec::new()),
            max_idle,
            _anchor: None,
        };
        // Fail early if the database cannot be opened at all
        let conn = pool.connect()?;
        pool.idle.lock().push(conn);
        Ok(pool)
    }

    /// Pool over a private in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let id = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:resource-store-{}-{}?mode=memory&cache=shared", std::process::id(), id);
        let target = Target::Memory(uri);
        let anchor = Self::connect_to(&target)?;
        Ok(Self {
            target,
            idle: Mutex::new(Vec::new()),
            max_idle: DEFAULT_POOL_SIZE,
            _anchor: Some(Mutex::new(anchor)),
        })
    }

    /// Pool for a configured database location; `:memory:` selects a private
    /// in-memory database.
    pub fn from_location(location: &str, max_idle: usize) -> Result<Self> {
        if location == ":memory:" {
            Self::open_in_memory()
        } else {
            Self::open(Path::new(location), max_idle)
        }
    }

    /// Check out a connection, opening a new one if none is idle.
    pub fn get(&self) -> Result<PooledConnection<'_>> {
        let conn = match self.idle.lock().pop() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        Ok(PooledConnection { conn: Some(conn), pool: self })
    }

    /// Number of connections currently idle.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn connect(&self) -> Result<Connection> {
        Self::connect_to(&self.target)
    }

    fn connect_to(target: &Target) -> Result<Connection> {
        let conn = match target {
            Target::File(path) => Connection::open(path),
            Target::Memory(uri) => Connection::open_with_flags(uri, OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI),
        }
        .map_err(|e| Error::Construction(format!("could not connect to {}: {}", target, e)))?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        tracing::debug!("Opened connection to {}", target);
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(path) => write!(f, "{}", path.display()),
            Target::Memory(uri) => f.write_str(uri),
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.target)
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

impl fmt::Display for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)
    }
}

/// Connection checked out of a [`ConnectionPool`], returned on drop.
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a ConnectionPool,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only taken in drop
        self.conn.as_ref().expect("connection already released")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
