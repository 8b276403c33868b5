//! Shared test fixtures
//!
//! The resource checks below hold for every store implementation and are run
//! against each of them over the same standard tree:
//!
//! ```text
//! FileA          "FileA Contents"
//! FileB          "FileB Contents"
//! DirC/
//!     FileD      "FileD Contents"
//! DirE/
//! ```

use std::fmt::Debug;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, params};

use crate::resource::{Resource, ResourceStore, ResourceType};
use crate::resources::{read_all, write_all};
use crate::{Error, paths};

/// Paths the resource checks are run against, defined or not.
pub const TEST_PATHS: &[&str] = &[
    "FileA",
    "FileB",
    "DirC",
    "DirC/FileD",
    "DirE",
    "UndefF",
    "DirC/UndefF",
    "DirE/UndefF",
];

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

/// Insert a directory row directly, bypassing the store.
pub fn add_dir(conn: &Connection, name: &str, parent: i64) -> i64 {
    conn.execute(
        "INSERT INTO resource (name, parent, content, last_modified) VALUES (?1, ?2, NULL, ?3)",
        params![name, parent, now_millis()],
    )
    .unwrap();
    conn.last_insert_rowid()
}

/// Insert a leaf row directly, bypassing the store.
pub fn add_file(conn: &Connection, name: &str, parent: i64, content: &[u8]) -> i64 {
    conn.execute(
        "INSERT INTO resource (name, parent, content, last_modified) VALUES (?1, ?2, ?3, ?4)",
        params![name, parent, content, now_millis()],
    )
    .unwrap();
    conn.last_insert_rowid()
}

type Theory<S> = fn(&S, &str);

fn theories<S>() -> Vec<(&'static str, Theory<S>)>
where
    S: ResourceStore,
    S::Resource: PartialEq + Debug,
{
    vec![
        ("same path", theory_same_path::<S> as Theory<S>),
        ("defined have date", theory_defined_have_date::<S> as Theory<S>),
        ("leaves have streams", theory_leaves_have_streams::<S> as Theory<S>),
        ("undefined have streams", theory_undefined_have_streams::<S> as Theory<S>),
        ("non-directories persist data", theory_non_directories_persist_data::<S> as Theory<S>),
        ("directories have no streams", theory_directories_have_no_streams::<S> as Theory<S>),
        ("children lists", theory_children_lists::<S> as Theory<S>),
        ("children know their parents", theory_children_know_their_parents::<S> as Theory<S>),
        ("parents know their children", theory_parents_know_their_children::<S> as Theory<S>),
        ("same path gives equal resource", theory_same_path_equal::<S> as Theory<S>),
        ("parent is directory", theory_parent_is_directory::<S> as Theory<S>),
        ("file makes a resource", theory_file_makes_resource::<S> as Theory<S>),
    ]
}

/// Run every resource check against every test path, each on a fresh store.
///
/// `fresh` returns a store holding the standard tree plus whatever keeps its
/// backing storage alive.
pub fn check_theories<S, G, F>(fresh: F)
where
    S: ResourceStore,
    S::Resource: PartialEq + Debug,
    F: Fn() -> (S, G),
{
    for (label, theory) in theories::<S>() {
        for path in TEST_PATHS {
            let (store, _guard) = fresh();
            eprintln!("theory {:?} on {:?}", label, path);
            theory(&store, path);
        }
    }
}

fn kind<R: Resource>(res: &R) -> ResourceType {
    res.resource_type().unwrap()
}

fn theory_same_path<S: ResourceStore>(store: &S, path: &str) {
    assert_eq!(store.get(path).path(), path);
    assert_eq!(store.get(path).name(), paths::name(path));
}

fn theory_defined_have_date<S: ResourceStore>(store: &S, path: &str) {
    let res = store.get(path);
    let modified = res.last_modified().unwrap();
    if kind(&res) == ResourceType::Undefined {
        assert_eq!(modified, UNIX_EPOCH);
    } else {
        assert!(modified > UNIX_EPOCH, "{} has no date", path);
    }
}

fn theory_leaves_have_streams<S: ResourceStore>(store: &S, path: &str) {
    let res = store.get(path);
    if kind(&res) != ResourceType::Resource {
        return;
    }
    assert!(res.input().is_ok());
    assert!(res.out().is_ok());
}

fn theory_undefined_have_streams<S: ResourceStore>(store: &S, path: &str) {
    let res = store.get(path);
    if kind(&res) != ResourceType::Undefined {
        return;
    }
    let mut content = Vec::new();
    res.input().unwrap().read_to_end(&mut content).unwrap();
    assert!(content.is_empty());
    assert_eq!(kind(&res), ResourceType::Undefined, "reading created {}", path);

    drop(res.out().unwrap());
    assert_eq!(kind(&res), ResourceType::Resource);
}

fn theory_non_directories_persist_data<S: ResourceStore>(store: &S, path: &str) {
    let res = store.get(path);
    if kind(&res) == ResourceType::Directory {
        return;
    }
    let data = [42u8, 29, 32, 120, 69, 0, 1];
    write_all(&res, &data).unwrap();
    assert_eq!(read_all(&res).unwrap(), data);
}

fn theory_directories_have_no_streams<S: ResourceStore>(store: &S, path: &str) {
    let res = store.get(path);
    if kind(&res) != ResourceType::Directory {
        return;
    }
    assert!(matches!(res.input(), Err(Error::NotAResource(_))));
    assert!(matches!(res.out(), Err(Error::NotAResource(_))));
}

fn theory_children_lists<S: ResourceStore>(store: &S, path: &str) {
    let res = store.get(path);
    let children = res.list().unwrap();
    match kind(&res) {
        ResourceType::Resource => assert!(children.is_none(), "{} listed children", path),
        ResourceType::Undefined => assert_eq!(children.map(|c| c.len()), Some(0)),
        ResourceType::Directory => assert!(children.is_some()),
    }
}

fn theory_children_know_their_parents<S>(store: &S, path: &str)
where
    S: ResourceStore,
    S::Resource: PartialEq + Debug,
{
    let res = store.get(path);
    if kind(&res) != ResourceType::Directory {
        return;
    }
    for child in res.list().unwrap().unwrap() {
        assert_eq!(child.parent().as_ref(), Some(&res));
    }
}

fn theory_parents_know_their_children<S>(store: &S, path: &str)
where
    S: ResourceStore,
    S::Resource: PartialEq + Debug,
{
    let res = store.get(path);
    if kind(&res) != ResourceType::Directory {
        return;
    }
    let Some(parent) = res.parent() else {
        return;
    };
    let siblings = parent.list().unwrap().unwrap();
    assert!(siblings.contains(&res), "{} missing from {:?}", path, siblings);
}

fn theory_same_path_equal<S>(store: &S, path: &str)
where
    S: ResourceStore,
    S::Resource: PartialEq + Debug,
{
    assert_eq!(store.get(path), store.get(path));
    assert_eq!(store.get(path), store.get(&format!("/{}/", path)));
}

fn theory_parent_is_directory<S: ResourceStore>(store: &S, path: &str) {
    let res = store.get(path);
    let Some(parent) = res.parent() else {
        return;
    };
    if kind(&res) != ResourceType::Undefined {
        assert_eq!(kind(&parent), ResourceType::Directory, "parent of {}", path);
    }
}

fn theory_file_makes_resource<S: ResourceStore>(store: &S, path: &str) {
    let res = store.get(path);
    if kind(&res) == ResourceType::Directory {
        assert!(res.file().is_err(), "{} gave a file", path);
        return;
    }
    let local = res.file().unwrap();
    assert!(local.is_file());
    assert_eq!(kind(&res), ResourceType::Resource);
    assert_eq!(std::fs::read(&local).unwrap(), read_all(&res).unwrap());
}

/// Concrete expectations on the standard tree.
pub fn check_standard_scenario<S>(store: &S)
where
    S: ResourceStore,
    S::Resource: PartialEq + Debug,
{
    let file_a = store.get("FileA");
    assert_eq!(kind(&file_a), ResourceType::Resource);
    assert_eq!(read_all(&file_a).unwrap(), b"FileA Contents");

    let dir_c = store.get("DirC");
    assert_eq!(kind(&dir_c), ResourceType::Directory);
    assert_eq!(dir_c.list().unwrap().unwrap(), vec![store.get("DirC/FileD")]);
    assert_eq!(read_all(&dir_c.get("FileD")).unwrap(), b"FileD Contents");

    let dir_e = store.get("DirE");
    assert_eq!(kind(&dir_e), ResourceType::Directory);
    assert!(dir_e.list().unwrap().unwrap().is_empty());

    let missing = store.get("DoesNotExist");
    assert_eq!(kind(&missing), ResourceType::Undefined);
    assert_eq!(missing.last_modified().unwrap(), UNIX_EPOCH);

    let base = store.get(paths::BASE);
    assert_eq!(kind(&base), ResourceType::Directory);
    assert!(base.parent().is_none());
    let names: Vec<String> = base
        .list()
        .unwrap()
        .unwrap()
        .iter()
        .map(|res| res.name().to_string())
        .collect();
    assert_eq!(names, ["DirC", "DirE", "FileA", "FileB"]);
    assert_eq!(store.get("DirC/FileD").parent(), Some(dir_c));
}
