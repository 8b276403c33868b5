//! Traversal queries for the resource tree
//!
//! Two strategies resolve the same questions:
//!
//! - [`Dialect::Embedded`] walks the tree one row at a time from the client,
//!   for databases with weak recursive query support. A walk spans several
//!   statements, so a concurrent writer can be observed half way through.
//! - [`Dialect::Recursive`] answers each question with a single
//!   `WITH RECURSIVE` statement.
//!
//! Both bound the number of steps by [`MAX_DEPTH`] so that a corrupted,
//! cyclic parent chain surfaces as an error instead of a hang.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, params};

use crate::{Error, Result};

/// Maximum number of parent links followed from any node.
pub const MAX_DEPTH: usize = 1024;

/// Deepest node reached while following a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    pub oid: i64,
    pub name: String,
    pub parent: Option<i64>,
    /// Number of path names matched
    pub depth: usize,
    /// `content IS NULL` for the matched node
    pub directory: bool,
}

/// Database specific traversal strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// Client side, statement per step.
    Embedded,
    /// Single recursive common table expression.
    #[default]
    Recursive,
}

const PATH_TO_STEP: &str = "SELECT parent, oid, name FROM resource WHERE oid = ?1";

const PATH_TO_RECURSIVE: &str = r#"
WITH RECURSIVE path(oid, name, parent, depth) AS (
    SELECT oid, name, parent, 0 FROM resource WHERE oid = ?1
  UNION ALL
    SELECT cur.oid, cur.name, cur.parent, rec.depth + 1
      FROM resource AS cur, path AS rec
      WHERE cur.oid = rec.parent AND rec.depth < ?2
)
SELECT oid, name, parent, depth FROM path ORDER BY depth DESC
"#;

const FIND_CHILD: &str =
    "SELECT oid, name, parent, content IS NULL FROM resource WHERE parent = ?1 AND name = ?2";

const FIND_SELF: &str = "SELECT oid, name, parent, content IS NULL FROM resource WHERE oid = ?1";

const FIND_BY_PATH_RECURSIVE: &str = r#"
WITH RECURSIVE path(oid, name, parent, depth, directory) AS (
    SELECT oid, name, parent, 0, content IS NULL FROM resource WHERE oid = ?1
  UNION ALL
    SELECT cur.oid, cur.name, cur.parent, rec.depth + 1, cur.content IS NULL
      FROM resource AS cur, path AS rec
      WHERE cur.parent = rec.oid
        AND rec.depth < ?3
        AND cur.name = json_extract(?2, '$[' || rec.depth || ']')
)
SELECT oid, name, parent, depth, directory FROM path ORDER BY depth DESC LIMIT 1
"#;

impl Dialect {
    /// Select a dialect from a configured driver name.
    ///
    /// H2 style embedded drivers get the iterative walk, everything else is
    /// assumed to handle recursive queries.
    pub fn from_driver(driver: &str) -> Self {
        let driver = driver.to_ascii_lowercase();
        if driver.contains("h2") || driver.contains("embedded") {
            Dialect::Embedded
        } else {
            Dialect::Recursive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Embedded => "embedded",
            Dialect::Recursive => "recursive",
        }
    }

    /// `(oid, name)` for every node from the root down to `oid`, inclusive.
    pub fn path_to(&self, conn: &Connection, oid: i64) -> Result<Vec<(i64, String)>> {
        tracing::debug!("path_to({}) using {} dialect", oid, self);
        match self {
            Dialect::Embedded => walk_path_to(conn, oid),
            Dialect::Recursive => recursive_path_to(conn, oid),
        }
    }

    /// Follow `names` from `context`, returning the deepest node reached.
    ///
    /// When nothing matches, the context node itself is returned with a
    /// depth of zero.
    pub fn find_by_path(&self, conn: &Connection, context: i64, names: &[String]) -> Result<PathMatch> {
        tracing::debug!("find_by_path({}, {:?}) using {} dialect", context, names, self);
        match self {
            Dialect::Embedded => walk_find_by_path(conn, context, names),
            Dialect::Recursive => recursive_find_by_path(conn, context, names),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "embedded" => Ok(Dialect::Embedded),
            "recursive" => Ok(Dialect::Recursive),
            other => Err(Error::Config(format!("unknown dialect: {}", other))),
        }
    }
}

fn walk_path_to(conn: &Connection, oid: i64) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare_cached(PATH_TO_STEP)?;
    let mut result = VecDeque::new();
    let mut next = oid;

    for _ in 0..=MAX_DEPTH {
        let row: Option<(Option<i64>, i64, String)> = stmt
            .query_row([next], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;

        let Some((parent, found, name)) = row else {
            return Err(Error::StorageConsistency(format!(
                "could not find resource {} while generating path of resource {}",
                next, oid
            )));
        };

        result.push_front((found, name));
        match parent {
            Some(parent) => next = parent,
            None => return Ok(result.into()),
        }
    }

    Err(Error::StorageConsistency(format!(
        "parent chain of resource {} is longer than {} steps",
        oid, MAX_DEPTH
    )))
}

fn recursive_path_to(conn: &Connection, oid: i64) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare_cached(PATH_TO_RECURSIVE)?;
    let rows = stmt
        .query_map(params![oid, MAX_DEPTH as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, Option<i64>>(2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    match rows.first() {
        None => Err(Error::StorageConsistency(format!("could not find resource {}", oid))),
        Some((top, _, Some(parent))) => Err(Error::StorageConsistency(format!(
            "parent chain of resource {} is broken at {} (parent {})",
            oid, top, parent
        ))),
        Some(_) => Ok(rows.into_iter().map(|(oid, name, _)| (oid, name)).collect()),
    }
}

fn row_to_match(row: &rusqlite::Row, depth: usize) -> rusqlite::Result<PathMatch> {
    Ok(PathMatch {
        oid: row.get(0)?,
        name: row.get(1)?,
        parent: row.get(2)?,
        depth,
        directory: row.get(3)?,
    })
}

fn walk_find_by_path(conn: &Connection, context: i64, names: &[String]) -> Result<PathMatch> {
    let mut stmt = conn.prepare_cached(FIND_CHILD)?;
    let mut found: Option<PathMatch> = None;
    let mut current = context;

    for (index, name) in names.iter().enumerate() {
        let step = stmt
            .query_row(params![current, name], |row| row_to_match(row, index + 1))
            .optional()?;
        match step {
            Some(step) => {
                current = step.oid;
                found = Some(step);
            }
            None => break,
        }
    }

    if let Some(found) = found {
        return Ok(found);
    }

    // Nothing matched, so the loop never read the context node itself
    conn.prepare_cached(FIND_SELF)?
        .query_row([context], |row| row_to_match(row, 0))
        .optional()?
        .ok_or_else(|| Error::StorageConsistency(format!("could not find context resource {}", context)))
}

fn recursive_find_by_path(conn: &Connection, context: i64, names: &[String]) -> Result<PathMatch> {
    let encoded = serde_json::to_string(names)
        .map_err(|e| Error::InvalidState(format!("could not encode path {:?}: {}", names, e)))?;

    conn.prepare_cached(FIND_BY_PATH_RECURSIVE)?
        .query_row(params![context, encoded, names.len() as i64], |row| {
            let depth: i64 = row.get(3)?;
            Ok(PathMatch {
                oid: row.get(0)?,
                name: row.get(1)?,
                parent: row.get(2)?,
                depth: depth as usize,
                directory: row.get(4)?,
            })
        })
        .optional()?
        .ok_or_else(|| Error::StorageConsistency(format!("could not find context resource {}", context)))
}
