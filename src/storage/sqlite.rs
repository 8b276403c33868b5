//! SQLite storage implementation of the resource contract

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use super::dialect::{Dialect, PathMatch};
use super::pool::ConnectionPool;
use super::schema::{self, ROOT_OID};
use crate::cache::{ResourceCache, SimpleResourceCache};
use crate::config::StoreConfig;
use crate::fs::{FileSystemResource, FileSystemResourceStore};
use crate::ignore::IgnoreFilter;
use crate::resource::{Resource, ResourceStore, ResourceType};
use crate::{Error, Result, paths, resources};

/// Construction options for [`SqlResourceStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub dialect: Dialect,
    /// Create the schema when no `resource` table exists
    pub init_db: bool,
    /// Script used instead of the built-in schema
    pub init_script: Option<PathBuf>,
    /// Base directory of the local file cache
    pub cache_dir: PathBuf,
}

impl StoreOptions {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            dialect: Dialect::default(),
            init_db: true,
            init_script: None,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn init_db(mut self, init_db: bool) -> Self {
        self.init_db = init_db;
        self
    }

    pub fn init_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.init_script = Some(script.into());
        self
    }
}

struct StoreInner {
    pool: ConnectionPool,
    dialect: Dialect,
    cache: SimpleResourceCache,
}

/// SQLite-backed resource store
///
/// Cloning is cheap; clones share the connection pool and cache.
#[derive(Clone)]
pub struct SqlResourceStore {
    inner: Arc<StoreInner>,
}

impl SqlResourceStore {
    /// Create a store over `pool`, initializing the schema if needed.
    pub fn with_pool(pool: ConnectionPool, options: StoreOptions) -> Result<Self> {
        Self::connect(pool, options).map(|(store, _)| store)
    }

    /// Open the store described by a configuration, importing the configured
    /// directory into a freshly initialized database.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let pool = ConnectionPool::from_location(&config.database, config.pool_size)?;
        let mut options = StoreOptions::new(&config.cache_dir)
            .dialect(Dialect::from_driver(&config.driver))
            .init_db(config.init_db);
        options.init_script = config.init_script.clone();

        let (store, fresh) = Self::connect(pool, options)?;
        if fresh && config.import {
            match &config.import_dir {
                Some(dir) => {
                    store.import(dir, &config.import_excludes)?;
                }
                None => tracing::warn!("Import requested but no import directory is configured"),
            }
        }
        Ok(store)
    }

    /// Private in-memory store (for testing).
    pub fn open_in_memory(dialect: Dialect, cache_dir: &Path) -> Result<Self> {
        Self::with_pool(ConnectionPool::open_in_memory()?, StoreOptions::new(cache_dir).dialect(dialect))
    }

    fn connect(pool: ConnectionPool, options: StoreOptions) -> Result<(Self, bool)> {
        let fresh = {
            let conn = pool
                .get()
                .map_err(|e| Error::Construction(format!("could not connect to {}: {}", pool, e)))?;
            if schema_exists(&conn)? {
                false
            } else if options.init_db {
                tracing::info!("Initializing resource store database {}", pool);
                initialize_schema(&conn, options.init_script.as_deref())?;
                true
            } else {
                return Err(Error::Construction(format!(
                    "{} has no resource table and initialization is disabled",
                    pool
                )));
            }
        };

        let inner = StoreInner {
            pool,
            dialect: options.dialect,
            cache: SimpleResourceCache::new(options.cache_dir),
        };
        Ok((Self { inner: Arc::new(inner) }, fresh))
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    pub fn cache(&self) -> &SimpleResourceCache {
        &self.inner.cache
    }

    /// Copy the tree under `dir` into this store, skipping excluded paths.
    /// Returns the number of resources copied.
    pub fn import(&self, dir: &Path, excludes: &[String]) -> Result<usize> {
        tracing::info!("Importing {} into resource store", dir.display());
        let source = FileSystemResourceStore::new(dir)?;
        let filter = IgnoreFilter::new(dir, Some(excludes));
        let count = resources::copy_tree(&source.get(paths::BASE), &self.get(paths::BASE), &|res: &FileSystemResource| {
            !filter.is_ignored(Path::new(res.path()), res.local_path().is_dir())
        })?;
        tracing::info!("Imported {} resources from {}", count, dir.display());
        Ok(count)
    }

    // ========== Node Operations ==========

    /// Look up the node at `names`, `None` if it does not exist.
    fn node(&self, conn: &Connection, names: &[String]) -> Result<Option<PathMatch>> {
        let found = self.inner.dialect.find_by_path(conn, ROOT_OID, names)?;
        Ok((found.depth == names.len()).then_some(found))
    }

    /// Directory node at `names`, created along with any missing ancestors.
    fn ensure_directory(&self, conn: &Connection, names: &[String]) -> Result<i64> {
        let found = self.inner.dialect.find_by_path(conn, ROOT_OID, names)?;
        if !found.directory {
            return Err(Error::NotADirectory(paths::join(&names[..found.depth])));
        }

        let mut parent = found.oid;
        for depth in found.depth..names.len() {
            parent = insert_child(conn, parent, &names[depth], None)?;
            let is_directory: bool = conn.query_row(
                "SELECT content IS NULL FROM resource WHERE oid = ?1",
                [parent],
                |row| row.get(0),
            )?;
            if !is_directory {
                return Err(Error::NotADirectory(paths::join(&names[..=depth])));
            }
        }
        Ok(parent)
    }

    /// Leaf node at `names`, created with empty content if missing.
    fn ensure_resource(&self, conn: &Connection, names: &[String]) -> Result<i64> {
        let Some((name, parent_names)) = names.split_last() else {
            return Err(Error::NotAResource(paths::BASE.to_string()));
        };

        if let Some(found) = self.node(conn, names)? {
            if found.directory {
                return Err(Error::NotAResource(paths::join(names)));
            }
            return Ok(found.oid);
        }

        let parent = self.ensure_directory(conn, parent_names)?;
        let oid = insert_child(conn, parent, name, Some(&[]))?;
        let is_directory: bool =
            conn.query_row("SELECT content IS NULL FROM resource WHERE oid = ?1", [oid], |row| row.get(0))?;
        if is_directory {
            return Err(Error::NotAResource(paths::join(names)));
        }
        tracing::debug!("Created resource {} ({})", paths::join(names), oid);
        Ok(oid)
    }

    /// Full path of a node, rebuilt through the dialect.
    pub fn path_of(&self, oid: i64) -> Result<String> {
        let conn = self.inner.pool.get()?;
        let steps = self.inner.dialect.path_to(&conn, oid)?;
        let names: Vec<&str> = steps.iter().skip(1).map(|(_, name)| name.as_str()).collect();
        Ok(paths::join(&names))
    }

    /// Object id of the node at `path`, `None` if undefined.
    pub fn oid_of(&self, path: &str) -> Result<Option<i64>> {
        let conn = self.inner.pool.get()?;
        Ok(self.node(&conn, &paths::names(path))?.map(|found| found.oid))
    }

    // ========== Bulk Operations ==========

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.inner.pool.get()?;
        let (directories, resources, bytes): (i64, i64, i64) = conn.query_row(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN content IS NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN content IS NULL THEN 0 ELSE 1 END), 0),
                COALESCE(SUM(LENGTH(content)), 0)
            FROM resource
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(StoreStats {
            directories: directories as usize,
            resources: resources as usize,
            bytes: bytes as u64,
        })
    }
}

impl ResourceStore for SqlResourceStore {
    type Resource = SqlResource;

    fn get(&self, path: &str) -> SqlResource {
        SqlResource {
            store: self.clone(),
            path: paths::normalize(path),
        }
    }

    fn move_to(&self, path: &str, target: &str) -> Result<bool> {
        let from = paths::names(path);
        let to = paths::names(target);
        let (Some((target_name, target_parent)), false) = (to.split_last(), from.is_empty()) else {
            return Err(Error::InvalidMove("the base directory cannot be moved".to_string()));
        };

        let conn = self.inner.pool.get()?;
        // Take the write lock up front so concurrent movers wait on the busy timeout
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let Some(source) = self.node(&tx, &from)? else {
            return Ok(false);
        };
        if from == to {
            return Ok(true);
        }
        if self.node(&tx, &to)?.is_some() {
            return Err(Error::AlreadyExists(paths::join(&to)));
        }

        let parent = self.ensure_directory(&tx, target_parent)?;
        let ancestry = self.inner.dialect.path_to(&tx, parent)?;
        if ancestry.iter().any(|(oid, _)| *oid == source.oid) {
            // Dropping the transaction discards directories created above
            return Err(Error::InvalidMove(format!(
                "cannot move {} below itself to {}",
                paths::join(&from),
                paths::join(&to)
            )));
        }
        tx.execute(
            "UPDATE resource SET parent = ?1, name = ?2 WHERE oid = ?3",
            params![parent, target_name, source.oid],
        )?;
        tx.commit()?;

        tracing::debug!("Moved {} to {}", paths::join(&from), paths::join(&to));
        Ok(true)
    }

    fn remove(&self, path: &str) -> Result<bool> {
        let names = paths::names(path);
        if names.is_empty() {
            return Err(Error::InvalidMove("the base directory cannot be removed".to_string()));
        }

        let conn = self.inner.pool.get()?;
        let Some(found) = self.node(&conn, &names)? else {
            return Ok(false);
        };
        // Descendants follow through ON DELETE CASCADE
        let removed = conn.execute("DELETE FROM resource WHERE oid = ?1", [found.oid])?;
        tracing::debug!("Removed {} ({})", paths::join(&names), found.oid);
        Ok(removed > 0)
    }
}

impl fmt::Debug for SqlResourceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlResourceStore")
            .field("pool", &self.inner.pool)
            .field("dialect", &self.inner.dialect)
            .finish()
    }
}

impl fmt::Display for SqlResourceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceStore {}", self.inner.pool)
    }
}

/// Handle over a path in a [`SqlResourceStore`].
///
/// Holds no row state: every operation resolves the path again.
#[derive(Clone)]
pub struct SqlResource {
    store: SqlResourceStore,
    path: String,
}

impl SqlResource {
    fn names(&self) -> Vec<String> {
        paths::names(&self.path)
    }

    fn lookup(&self) -> Result<Option<PathMatch>> {
        let conn = self.store.inner.pool.get()?;
        self.store.node(&conn, &self.names())
    }

    /// Writer over the content, creating the resource if needed.
    ///
    /// Unlike [`Resource::out`] the concrete writer can be finished
    /// explicitly to observe write errors.
    pub fn writer(&self) -> Result<ContentWriter> {
        let conn = self.store.inner.pool.get()?;
        let oid = self.store.ensure_resource(&conn, &self.names())?;
        Ok(ContentWriter {
            inner: Arc::clone(&self.store.inner),
            oid,
            path: self.path.clone(),
            buffer: Vec::new(),
            dirty: true,
        })
    }

    /// Content length in bytes, `None` unless this is a resource.
    pub fn size(&self) -> Result<Option<u64>> {
        let conn = self.store.inner.pool.get()?;
        let Some(found) = self.store.node(&conn, &self.names())? else {
            return Ok(None);
        };
        if found.directory {
            return Ok(None);
        }
        let length: Option<i64> = conn
            .query_row("SELECT LENGTH(content) FROM resource WHERE oid = ?1", [found.oid], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(length.map(|n| n.max(0) as u64))
    }
}

impl Resource for SqlResource {
    fn path(&self) -> &str {
        &self.path
    }

    fn resource_type(&self) -> Result<ResourceType> {
        Ok(match self.lookup()? {
            None => ResourceType::Undefined,
            Some(found) if found.directory => ResourceType::Directory,
            Some(_) => ResourceType::Resource,
        })
    }

    fn last_modified(&self) -> Result<SystemTime> {
        let conn = self.store.inner.pool.get()?;
        let Some(found) = self.store.node(&conn, &self.names())? else {
            return Ok(UNIX_EPOCH);
        };
        let millis: i64 = conn
            .query_row("SELECT last_modified FROM resource WHERE oid = ?1", [found.oid], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::StorageConsistency(format!("resource {} vanished while reading", self.path)))?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64))
    }

    fn parent(&self) -> Option<Self> {
        paths::parent(&self.path).map(|parent| self.store.get(&parent))
    }

    fn get(&self, path: &str) -> Self {
        self.store.get(&paths::join(&[self.path.as_str(), path]))
    }

    fn list(&self) -> Result<Option<Vec<Self>>> {
        let conn = self.store.inner.pool.get()?;
        let Some(found) = self.store.node(&conn, &self.names())? else {
            return Ok(Some(Vec::new()));
        };
        if !found.directory {
            return Ok(None);
        }

        let mut stmt = conn.prepare_cached("SELECT name FROM resource WHERE parent = ?1 ORDER BY name")?;
        let children = stmt
            .query_map([found.oid], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|name| self.get(&name))
            .collect();
        Ok(Some(children))
    }

    fn input(&self) -> Result<Box<dyn Read>> {
        let conn = self.store.inner.pool.get()?;
        let Some(found) = self.store.node(&conn, &self.names())? else {
            return Ok(Box::new(io::empty()));
        };
        if found.directory {
            return Err(Error::NotAResource(self.path.clone()));
        }

        let content: Option<Vec<u8>> = conn
            .query_row("SELECT content FROM resource WHERE oid = ?1", [found.oid], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::StorageConsistency(format!("resource {} vanished while reading", self.path)))?;
        match content {
            Some(content) => Ok(Box::new(Cursor::new(content))),
            None => Err(Error::NotAResource(self.path.clone())),
        }
    }

    fn out(&self) -> Result<Box<dyn Write>> {
        Ok(Box::new(self.writer()?))
    }

    fn file(&self) -> Result<PathBuf> {
        if self.lookup()?.is_none() {
            let conn = self.store.inner.pool.get()?;
            self.store.ensure_resource(&conn, &self.names())?;
        }
        self.store.inner.cache.cache(self)
    }

    fn dir(&self) -> Result<PathBuf> {
        {
            let conn = self.store.inner.pool.get()?;
            self.store.ensure_directory(&conn, &self.names())?;
        }
        let local = self.store.inner.cache.local_path(&self.path);
        std::fs::create_dir_all(&local)?;
        Ok(local)
    }
}

impl PartialEq for SqlResource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store.inner, &other.store.inner) && self.path == other.path
    }
}

impl Eq for SqlResource {}

impl Hash for SqlResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for SqlResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlResource").field("path", &self.path).finish()
    }
}

impl fmt::Display for SqlResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Buffered writer replacing a resource's content.
///
/// Content is stored on [`flush`](Write::flush), [`finish`](ContentWriter::finish)
/// or drop; a failure during drop is only logged.
pub struct ContentWriter {
    inner: Arc<StoreInner>,
    oid: i64,
    path: String,
    buffer: Vec<u8>,
    dirty: bool,
}

impl ContentWriter {
    /// Store the buffered content and report any error.
    pub fn finish(mut self) -> Result<()> {
        self.persist()
    }

    fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let conn = self.inner.pool.get()?;
        let updated = conn.execute(
            "UPDATE resource SET content = ?1, last_modified = ?2 WHERE oid = ?3",
            params![self.buffer, now_millis(), self.oid],
        )?;
        if updated == 0 {
            return Err(Error::StorageConsistency(format!(
                "resource {} vanished while writing",
                self.path
            )));
        }
        self.dirty = false;
        Ok(())
    }
}

impl Write for ContentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.persist().map_err(|e| match e {
            Error::Io(e) => e,
            other => io::Error::other(other),
        })
    }
}

impl Drop for ContentWriter {
    fn drop(&mut self) {
        if let Err(e) = self.persist() {
            tracing::warn!("Failed to store content of {}: {}", self.path, e);
        }
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub directories: usize,
    pub resources: usize,
    pub bytes: u64,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Directories: {}", self.directories)?;
        writeln!(f, "  Resources: {}", self.resources)?;
        writeln!(f, "  Content bytes: {}", self.bytes)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Whether a `resource` table is already present
fn schema_exists(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'resource'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Run the init script, the built-in schema unless a script file is given
fn initialize_schema(conn: &Connection, script: Option<&Path>) -> Result<()> {
    let script = match script {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            Error::Construction(format!("could not read init script {}: {}", path.display(), e))
        })?,
        None => schema::init_script(),
    };
    conn.execute_batch(&script)
        .map_err(|e| Error::Construction(format!("could not initialize resource database: {}", e)))
}

/// Insert a child unless one with the same name exists; returns its oid
fn insert_child(conn: &Connection, parent: i64, name: &str, content: Option<&[u8]>) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO resource (name, parent, content, last_modified) VALUES (?1, ?2, ?3, ?4)",
        params![name, parent, content, now_millis()],
    )?;
    let oid = conn.query_row(
        "SELECT oid FROM resource WHERE parent = ?1 AND name = ?2",
        params![parent, name],
        |row| row.get(0),
    )?;
    Ok(oid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{read_all, write_all};
    use crate::testing::{self, add_dir, add_file};

    const DIALECTS: [Dialect; 2] = [Dialect::Embedded, Dialect::Recursive];

    /// Store over a fresh database holding the standard test tree
    fn standard_store(dialect: Dialect) -> (SqlResourceStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlResourceStore::open_in_memory(dialect, &dir.path().join("cache")).unwrap();
        {
            let conn = store.inner.pool.get().unwrap();
            add_file(&conn, "FileA", ROOT_OID, b"FileA Contents");
            add_file(&conn, "FileB", ROOT_OID, b"FileB Contents");
            let c = add_dir(&conn, "DirC", ROOT_OID);
            add_file(&conn, "FileD", c, b"FileD Contents");
            add_dir(&conn, "DirE", ROOT_OID);
        }
        (store, dir)
    }

    #[test]
    fn test_initialize_empty_db() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("store.db");
        let _store = SqlResourceStore::with_pool(ConnectionPool::open(&db, 2).unwrap(), StoreOptions::new(dir.path())).unwrap();

        let conn = Connection::open(&db).unwrap();
        let (name, parent, content): (String, Option<i64>, Option<Vec<u8>>) = conn
            .query_row("SELECT name, parent, content FROM resource WHERE oid = 0", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .unwrap();
        assert_eq!(name, "");
        assert_eq!(parent, None);
        assert_eq!(content, None);

        let roots: i64 = conn
            .query_row("SELECT COUNT(*) FROM resource WHERE parent IS NULL", [], |row| row.get(0))
            .unwrap();
        assert_eq!(roots, 1);
    }

    #[test]
    fn test_accept_initialized_db() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("store.db");
        {
            let conn = Connection::open(&db).unwrap();
            conn.execute_batch(&schema::init_script()).unwrap();
            add_file(&conn, "FileA", ROOT_OID, b"FileA Contents");
        }

        // Initialization disabled: an existing schema is all that is needed
        let options = StoreOptions::new(dir.path()).init_db(false);
        let store = SqlResourceStore::with_pool(ConnectionPool::open(&db, 2).unwrap(), options).unwrap();
        assert_eq!(read_all(&store.get("FileA")).unwrap(), b"FileA Contents");

        let conn = Connection::open(&db).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM resource", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_initialize_with_irrelevant_table() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("store.db");
        Connection::open(&db)
            .unwrap()
            .execute_batch("CREATE TABLE foo (oid INTEGER PRIMARY KEY);")
            .unwrap();

        let store = SqlResourceStore::with_pool(ConnectionPool::open(&db, 2).unwrap(), StoreOptions::new(dir.path())).unwrap();
        assert_eq!(store.get("").resource_type().unwrap(), ResourceType::Directory);
    }

    #[test]
    fn test_missing_schema_without_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions::new(dir.path()).init_db(false);
        let err = SqlResourceStore::with_pool(ConnectionPool::open_in_memory().unwrap(), options).unwrap_err();
        assert!(matches!(err, Error::Construction(_)));
    }

    #[test]
    fn test_init_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("init.sql");
        std::fs::write(&script, schema::init_script()).unwrap();
        let options = StoreOptions::new(dir.path()).init_script(&script);
        let store = SqlResourceStore::with_pool(ConnectionPool::open_in_memory().unwrap(), options).unwrap();
        assert_eq!(store.oid_of("").unwrap(), Some(ROOT_OID));

        let options = StoreOptions::new(dir.path()).init_script(dir.path().join("missing.sql"));
        let err = SqlResourceStore::with_pool(ConnectionPool::open_in_memory().unwrap(), options).unwrap_err();
        assert!(matches!(err, Error::Construction(_)));

        let broken = dir.path().join("broken.sql");
        std::fs::write(&broken, "CREATE TABLE resource (").unwrap();
        let options = StoreOptions::new(dir.path()).init_script(&broken);
        let err = SqlResourceStore::with_pool(ConnectionPool::open_in_memory().unwrap(), options).unwrap_err();
        assert!(matches!(err, Error::Construction(_)));
    }

    #[test]
    fn test_resource_theories() {
        for dialect in DIALECTS {
            testing::check_theories(|| standard_store(dialect));
        }
    }

    #[test]
    fn test_standard_scenario() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            testing::check_standard_scenario(&store);
        }
    }

    #[test]
    fn test_path_roundtrip() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            for path in ["FileA", "DirC", "DirC/FileD", "new/deeply/nested.txt"] {
                write_all(&store.get(path), b"x").or_else(|_| store.get(path).dir().map(|_| ())).unwrap();
                let oid = store.oid_of(path).unwrap().unwrap();
                assert_eq!(store.path_of(oid).unwrap(), path, "{}", dialect);
            }
            assert_eq!(store.path_of(ROOT_OID).unwrap(), "");
        }
    }

    #[test]
    fn test_out_creates_missing_directories() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            let res = store.get("DirE/UndefG/UndefH/UndefI");
            assert_eq!(res.resource_type().unwrap(), ResourceType::Undefined);

            write_all(&res, b"deep").unwrap();
            assert_eq!(res.resource_type().unwrap(), ResourceType::Resource);
            assert_eq!(store.get("DirE/UndefG").resource_type().unwrap(), ResourceType::Directory);
            assert_eq!(store.get("DirE/UndefG/UndefH").resource_type().unwrap(), ResourceType::Directory);
            assert_eq!(read_all(&res).unwrap(), b"deep");
        }
    }

    #[test]
    fn test_out_below_leaf_fails() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            let err = store.get("FileA/child").out().err().unwrap();
            assert!(matches!(err, Error::NotADirectory(ref p) if p == "FileA"), "{:?}", err);
        }
    }

    #[test]
    fn test_out_replaces_content_and_touches() {
        let (store, _dir) = standard_store(Dialect::Recursive);
        let res = store.get("FileA");
        let before = res.last_modified().unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let mut writer = res.writer().unwrap();
        writer.write_all(b"short").unwrap();
        writer.finish().unwrap();

        assert_eq!(read_all(&res).unwrap(), b"short");
        assert!(res.last_modified().unwrap() > before);
    }

    #[test]
    fn test_input_of_undefined_creates_nothing() {
        let (store, _dir) = standard_store(Dialect::Embedded);
        let res = store.get("UndefF");
        let mut content = Vec::new();
        res.input().unwrap().read_to_end(&mut content).unwrap();
        assert!(content.is_empty());
        assert_eq!(res.resource_type().unwrap(), ResourceType::Undefined);
    }

    #[test]
    fn test_dir_creates_directory() {
        for dialect in DIALECTS {
            let (store, dir) = standard_store(dialect);
            let local = store.get("DirX/DirY").dir().unwrap();
            assert!(local.is_dir());
            assert!(local.starts_with(dir.path()));
            assert_eq!(store.get("DirX/DirY").resource_type().unwrap(), ResourceType::Directory);
            assert_eq!(store.get("DirX/DirY").list().unwrap().unwrap().len(), 0);

            let err = store.get("FileA").dir().unwrap_err();
            assert!(matches!(err, Error::NotADirectory(_)));
        }
    }

    #[test]
    fn test_file_creates_missing_resource() {
        for dialect in DIALECTS {
            let (store, dir) = standard_store(dialect);
            let res = store.get("New/leaf.txt");
            let local = res.file().unwrap();

            assert_eq!(res.resource_type().unwrap(), ResourceType::Resource, "{}", dialect);
            assert_eq!(store.get("New").resource_type().unwrap(), ResourceType::Directory);
            assert!(read_all(&res).unwrap().is_empty());
            assert_eq!(local, dir.path().join("cache/New/leaf.txt"));
            assert_eq!(std::fs::read(&local).unwrap(), b"");

            assert!(matches!(store.get("FileA/below").file(), Err(Error::NotADirectory(_))));
        }
    }

    #[test]
    fn test_file_refreshes_only_when_newer() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            let res = store.get("DirC/FileD");
            let local = res.file().unwrap();
            assert_eq!(std::fs::read(&local).unwrap(), b"FileD Contents");
            let cached_at = res.last_modified().unwrap();
            assert_eq!(std::fs::metadata(&local).unwrap().modified().unwrap(), cached_at);

            // Unchanged resource: the millisecond timestamp still compares as fresh
            std::fs::write(&local, b"local edit").unwrap();
            std::fs::File::options().write(true).open(&local).unwrap().set_modified(cached_at).unwrap();
            assert_eq!(std::fs::read(res.file().unwrap()).unwrap(), b"local edit", "{}", dialect);

            std::thread::sleep(Duration::from_millis(20));
            write_all(&res, b"C2").unwrap();
            assert!(res.last_modified().unwrap() > cached_at);
            assert_eq!(std::fs::read(res.file().unwrap()).unwrap(), b"C2");
        }
    }

    #[test]
    fn test_file_refuses_directory_every_time() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            let res = store.get("DirC");
            assert!(matches!(res.file(), Err(Error::Unsupported(_))));
            std::thread::sleep(Duration::from_millis(20));
            assert!(matches!(res.file(), Err(Error::Unsupported(_))), "{}", dialect);

            // Also after dir() has created the local directory
            let dir_e = store.get("DirE");
            dir_e.dir().unwrap();
            assert!(matches!(dir_e.file(), Err(Error::Unsupported(_))));
        }
    }

    #[test]
    fn test_size() {
        let (store, _dir) = standard_store(Dialect::Embedded);
        assert_eq!(store.get("FileA").size().unwrap(), Some(14));
        assert_eq!(store.get("DirC").size().unwrap(), None);
        assert_eq!(store.get("UndefF").size().unwrap(), None);
        write_all(&store.get("Empty"), b"").unwrap();
        assert_eq!(store.get("Empty").size().unwrap(), Some(0));
    }

    #[test]
    fn test_remove_cascades() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            let file_d = store.oid_of("DirC/FileD").unwrap().unwrap();

            assert!(store.remove("DirC").unwrap());
            assert_eq!(store.get("DirC").resource_type().unwrap(), ResourceType::Undefined);
            assert_eq!(store.get("DirC/FileD").resource_type().unwrap(), ResourceType::Undefined);

            let conn = store.inner.pool.get().unwrap();
            let remaining: i64 = conn
                .query_row("SELECT COUNT(*) FROM resource WHERE oid = ?1", [file_d], |row| row.get(0))
                .unwrap();
            assert_eq!(remaining, 0, "{}", dialect);
            drop(conn);

            assert!(!store.remove("DirC").unwrap());
            assert!(store.remove("FileA").unwrap());
            assert!(matches!(store.remove(""), Err(Error::InvalidMove(_))));
        }
    }

    #[test]
    fn test_move_resource() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            let oid = store.oid_of("FileA").unwrap().unwrap();

            assert!(store.move_to("FileA", "DirE/Renamed").unwrap());
            assert_eq!(store.get("FileA").resource_type().unwrap(), ResourceType::Undefined);
            assert_eq!(store.oid_of("DirE/Renamed").unwrap(), Some(oid));
            assert_eq!(read_all(&store.get("DirE/Renamed")).unwrap(), b"FileA Contents");

            assert!(!store.move_to("FileA", "Elsewhere").unwrap());
        }
    }

    #[test]
    fn test_move_directory_carries_children() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            assert!(store.move_to("DirC", "New/Parent/DirC2").unwrap());

            let moved = store.get("New/Parent/DirC2/FileD");
            assert_eq!(read_all(&moved).unwrap(), b"FileD Contents", "{}", dialect);
            let oid = store.oid_of("New/Parent/DirC2/FileD").unwrap().unwrap();
            assert_eq!(store.path_of(oid).unwrap(), "New/Parent/DirC2/FileD");
        }
    }

    #[test]
    fn test_move_refusals() {
        for dialect in DIALECTS {
            let (store, _dir) = standard_store(dialect);
            assert!(matches!(store.move_to("FileA", "FileB"), Err(Error::AlreadyExists(_))));
            assert!(matches!(store.move_to("DirC", "DirC/Inner/DirC"), Err(Error::InvalidMove(_))));
            assert!(matches!(store.move_to("", "Root"), Err(Error::InvalidMove(_))));
            assert!(matches!(store.move_to("FileB", "FileA/Below"), Err(Error::NotADirectory(_))));

            // The refused move into its own subtree left nothing behind
            assert_eq!(store.get("DirC/Inner").resource_type().unwrap(), ResourceType::Undefined);
            assert!(store.move_to("FileA", "FileA").unwrap());
        }
    }

    #[test]
    fn test_stats() {
        let (store, _dir) = standard_store(Dialect::Recursive);
        let stats = store.stats().unwrap();
        // Root counts as a directory
        assert_eq!(stats.directories, 3);
        assert_eq!(stats.resources, 3);
        assert_eq!(stats.bytes, 42);
    }

    #[test]
    fn test_import_directory() {
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("styles")).unwrap();
        std::fs::create_dir_all(source.path().join("empty")).unwrap();
        std::fs::create_dir_all(source.path().join("logs")).unwrap();
        std::fs::write(source.path().join("global.xml"), b"<global/>").unwrap();
        std::fs::write(source.path().join("styles/point.sld"), b"<sld/>").unwrap();
        std::fs::write(source.path().join("logs/server.log"), b"noise").unwrap();

        let cache = tempfile::tempdir().unwrap();
        let store = SqlResourceStore::open_in_memory(Dialect::Recursive, cache.path()).unwrap();
        let count = store.import(source.path(), &["logs/".to_string()]).unwrap();

        assert_eq!(count, 2);
        assert_eq!(read_all(&store.get("styles/point.sld")).unwrap(), b"<sld/>");
        assert_eq!(store.get("empty").resource_type().unwrap(), ResourceType::Directory);
        assert_eq!(store.get("logs").resource_type().unwrap(), ResourceType::Undefined);
    }

    #[test]
    fn test_open_from_config_imports_once() {
        let data = tempfile::tempdir().unwrap();
        let source = data.path().join("legacy");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("a.txt"), b"A").unwrap();

        let config = StoreConfig {
            database: data.path().join("store.db").to_string_lossy().into_owned(),
            cache_dir: data.path().join("cache"),
            import: true,
            import_dir: Some(source.clone()),
            ..StoreConfig::default()
        };
        let store = SqlResourceStore::open(&config).unwrap();
        assert_eq!(read_all(&store.get("a.txt")).unwrap(), b"A");
        drop(store);

        // An already initialized database is not imported into again
        std::fs::write(source.join("b.txt"), b"B").unwrap();
        let store = SqlResourceStore::open(&config).unwrap();
        assert_eq!(store.get("b.txt").resource_type().unwrap(), ResourceType::Undefined);
    }

    #[test]
    fn test_concurrent_handles() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("store.db"), 4).unwrap();
        let store = SqlResourceStore::with_pool(pool, StoreOptions::new(dir.path().join("cache"))).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let path = format!("threads/t{}/data", i);
                    write_all(&store.get(&path), path.as_bytes())?;
                    read_all(&store.get(&path))
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let content = handle.join().unwrap().unwrap();
            assert_eq!(content, format!("threads/t{}/data", i).into_bytes());
        }
        assert_eq!(store.get("threads").list().unwrap().unwrap().len(), 4);
    }

    #[test]
    fn test_concurrent_moves() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("store.db"), 4).unwrap();
        let store = SqlResourceStore::with_pool(pool, StoreOptions::new(dir.path().join("cache"))).unwrap();
        for i in 0..4 {
            write_all(&store.get(&format!("incoming/f{}", i)), b"x").unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.move_to(&format!("incoming/f{}", i), &format!("done/d{}/f", i)))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().unwrap());
        }
        assert!(store.get("incoming").list().unwrap().unwrap().is_empty());
        assert_eq!(store.get("done").list().unwrap().unwrap().len(), 4);
    }
}
