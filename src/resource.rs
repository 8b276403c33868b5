//! Resource model
//!
//! A [`Resource`] is a lightweight handle keyed by path. It does not own the
//! entry it names: the entry may not exist yet (type [`ResourceType::Undefined`])
//! and is created lazily the first time content is written or a directory is
//! requested. Handles are cheap to create and two handles for the same path on
//! the same store are equal.

use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

use crate::{Error, Result};

/// Kind of entry a resource currently denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Holds children, available through [`Resource::list`].
    Directory,
    /// Holds content, available through [`Resource::input`] and [`Resource::out`].
    Resource,
    /// Nothing exists at this path yet.
    Undefined,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Directory => "directory",
            ResourceType::Resource => "resource",
            ResourceType::Undefined => "undefined",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "directory" => Ok(ResourceType::Directory),
            "resource" => Ok(ResourceType::Resource),
            "undefined" => Ok(ResourceType::Undefined),
            other => Err(Error::InvalidState(format!("unknown resource type: {}", other))),
        }
    }
}

/// Path-keyed handle over an entry of a [`ResourceStore`].
pub trait Resource: Sized {
    /// Normalized path from the store base; `""` for the base itself.
    fn path(&self) -> &str;

    /// Last name in [`Resource::path`].
    fn name(&self) -> &str {
        crate::paths::name(self.path())
    }

    /// Current type, resolved against the backing medium on every call.
    fn resource_type(&self) -> Result<ResourceType>;

    /// Time the content was last changed. `UNIX_EPOCH` for undefined resources.
    fn last_modified(&self) -> Result<SystemTime>;

    /// Parent handle, `None` for the base.
    fn parent(&self) -> Option<Self>;

    /// Handle for a path relative to this one.
    fn get(&self, path: &str) -> Self;

    /// Children of a directory.
    ///
    /// `None` for a leaf resource, an empty list for an undefined one.
    fn list(&self) -> Result<Option<Vec<Self>>>;

    /// Read access to the content. Fails for directories; an undefined
    /// resource reads as empty.
    fn input(&self) -> Result<Box<dyn Read>>;

    /// Write access to the content, creating the resource (and any missing
    /// parent directories) if needed. Fails for directories.
    fn out(&self) -> Result<Box<dyn Write>>;

    /// Local file carrying the content, for code that needs a real path.
    fn file(&self) -> Result<PathBuf>;

    /// Local directory for this resource, creating the directory if needed.
    fn dir(&self) -> Result<PathBuf>;
}

/// Path based access to a tree of resources.
pub trait ResourceStore {
    type Resource: Resource;

    /// Handle for `path`. Never fails; the resource may be undefined.
    fn get(&self, path: &str) -> Self::Resource;

    /// Relocate the entry at `path` to `target`. Returns `false` when nothing
    /// exists at `path`.
    fn move_to(&self, path: &str, target: &str) -> Result<bool>;

    /// Delete the entry at `path`, including everything below it. Returns
    /// `false` when nothing exists at `path`.
    fn remove(&self, path: &str) -> Result<bool>;
}
