//! Database schema definitions

/// Object id of the root node.
pub const ROOT_OID: i64 = 0;

/// SQL to create the resource table
///
/// `content IS NULL` marks a directory. Children are removed with their
/// parent through the foreign key cascade, which requires
/// `PRAGMA foreign_keys = ON` on every connection.
pub const CREATE_RESOURCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS resource (
    oid INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    parent INTEGER REFERENCES resource(oid) ON UPDATE RESTRICT ON DELETE CASCADE,
    content BLOB,
    last_modified INTEGER NOT NULL DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)),
    UNIQUE(parent, name),
    CHECK (parent IS NOT NULL OR oid = 0)
)
"#;

/// SQL to create the root node
pub const INSERT_ROOT: &str =
    "INSERT OR IGNORE INTO resource (oid, name, parent, content) VALUES (0, '', NULL, NULL)";

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_resource_parent_name ON resource(parent, name)",
];

/// SQL to drop everything created by the init script
pub const DROP_SCRIPT: &str = "DROP INDEX IF EXISTS idx_resource_parent_name;\nDROP TABLE IF EXISTS resource;\n";

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_RESOURCE_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts.push(INSERT_ROOT);
    stmts
}

/// Schema creation statements as a single script, in the form written out
/// next to the configuration and accepted back as an init script.
pub fn init_script() -> String {
    all_schema_statements()
        .into_iter()
        .map(|stmt| format!("{};\n", stmt.trim()))
        .collect()
}
