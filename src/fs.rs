//! Resource store over a local directory
//!
//! Resources map one to one onto files and directories below a base
//! directory. Used as the reference implementation of the resource contract
//! and as the source when importing a directory tree.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::resource::{Resource, ResourceStore, ResourceType};
use crate::{Error, Result, paths};

/// Resource store backed by a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileSystemResourceStore {
    base: Arc<PathBuf>,
}

impl FileSystemResourceStore {
    /// Store rooted at `base`, which is created if missing.
    pub fn new(base: &Path) -> Result<Self> {
        if base.exists() && !base.is_dir() {
            return Err(Error::Construction(format!("{} is not a directory", base.display())));
        }
        fs::create_dir_all(base)
            .map_err(|e| Error::Construction(format!("could not create {}: {}", base.display(), e)))?;
        Ok(Self {
            base: Arc::new(base.to_path_buf()),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn local_path(&self, path: &str) -> PathBuf {
        paths::names(path)
            .iter()
            .fold(self.base.to_path_buf(), |local, name| local.join(name))
    }
}

impl ResourceStore for FileSystemResourceStore {
    type Resource = FileSystemResource;

    fn get(&self, path: &str) -> FileSystemResource {
        let path = paths::normalize(path);
        FileSystemResource {
            local: self.local_path(&path),
            store: self.clone(),
            path,
        }
    }

    fn move_to(&self, path: &str, target: &str) -> Result<bool> {
        let from = self.get(path);
        let to = self.get(target);
        if from.path.is_empty() || to.path.is_empty() {
            return Err(Error::InvalidMove("the base directory cannot be moved".to_string()));
        }
        if !from.local.exists() {
            return Ok(false);
        }
        if from == to {
            return Ok(true);
        }
        if to.local.exists() {
            return Err(Error::AlreadyExists(to.path));
        }
        if to.path.starts_with(&format!("{}/", from.path)) {
            return Err(Error::InvalidMove(format!("cannot move {} below itself to {}", from.path, to.path)));
        }

        if let Some(parent) = to.local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&from.local, &to.local)?;
        tracing::debug!("Moved {} to {}", from.path, to.path);
        Ok(true)
    }

    fn remove(&self, path: &str) -> Result<bool> {
        let res = self.get(path);
        if res.path.is_empty() {
            return Err(Error::InvalidMove("the base directory cannot be removed".to_string()));
        }
        match res.resource_type()? {
            ResourceType::Undefined => return Ok(false),
            ResourceType::Directory => fs::remove_dir_all(&res.local)?,
            ResourceType::Resource => fs::remove_file(&res.local)?,
        }
        tracing::debug!("Removed {}", res.path);
        Ok(true)
    }
}

/// File or directory below a [`FileSystemResourceStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileSystemResource {
    store: FileSystemResourceStore,
    path: String,
    local: PathBuf,
}

impl FileSystemResource {
    /// Backing file or directory, which may not exist.
    pub fn local_path(&self) -> &Path {
        &self.local
    }
}

impl Resource for FileSystemResource {
    fn path(&self) -> &str {
        &self.path
    }

    fn resource_type(&self) -> Result<ResourceType> {
        match fs::metadata(&self.local) {
            Ok(meta) if meta.is_dir() => Ok(ResourceType::Directory),
            Ok(meta) if meta.is_file() => Ok(ResourceType::Resource),
            Ok(_) => Err(Error::InvalidState(format!(
                "{} is neither a file nor a directory",
                self.local.display()
            ))),
            Err(e) if is_missing(&e) => Ok(ResourceType::Undefined),
            Err(e) => Err(e.into()),
        }
    }

    fn last_modified(&self) -> Result<SystemTime> {
        match fs::metadata(&self.local) {
            Ok(meta) => Ok(meta.modified()?),
            Err(e) if is_missing(&e) => Ok(UNIX_EPOCH),
            Err(e) => Err(e.into()),
        }
    }

    fn parent(&self) -> Option<Self> {
        paths::parent(&self.path).map(|parent| self.store.get(&parent))
    }

    fn get(&self, path: &str) -> Self {
        self.store.get(&paths::join(&[self.path.as_str(), path]))
    }

    fn list(&self) -> Result<Option<Vec<Self>>> {
        match self.resource_type()? {
            ResourceType::Undefined => Ok(Some(Vec::new())),
            ResourceType::Resource => Ok(None),
            ResourceType::Directory => {
                let mut names = fs::read_dir(&self.local)?
                    .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
                    .collect::<io::Result<Vec<_>>>()?;
                names.sort();
                Ok(Some(names.iter().map(|name| self.get(name)).collect()))
            }
        }
    }

    fn input(&self) -> Result<Box<dyn Read>> {
        match self.resource_type()? {
            ResourceType::Directory => Err(Error::NotAResource(self.path.clone())),
            ResourceType::Undefined => Ok(Box::new(io::empty())),
            ResourceType::Resource => Ok(Box::new(File::open(&self.local)?)),
        }
    }

    fn out(&self) -> Result<Box<dyn Write>> {
        if self.resource_type()? == ResourceType::Directory {
            return Err(Error::NotAResource(self.path.clone()));
        }
        if let Some(parent) = self.local.parent() {
            fs::create_dir_all(parent).map_err(|e| match e.kind() {
                io::ErrorKind::NotADirectory | io::ErrorKind::AlreadyExists => {
                    Error::NotADirectory(paths::parent(&self.path).unwrap_or_default())
                }
                _ => e.into(),
            })?;
        }
        Ok(Box::new(File::create(&self.local)?))
    }

    fn file(&self) -> Result<PathBuf> {
        match self.resource_type()? {
            ResourceType::Directory => Err(Error::NotAResource(self.path.clone())),
            ResourceType::Undefined => {
                // Leaves an empty file behind
                drop(self.out()?);
                Ok(self.local.clone())
            }
            ResourceType::Resource => Ok(self.local.clone()),
        }
    }

    fn dir(&self) -> Result<PathBuf> {
        if self.resource_type()? == ResourceType::Resource {
            return Err(Error::NotADirectory(self.path.clone()));
        }
        fs::create_dir_all(&self.local)?;
        Ok(self.local.clone())
    }
}

/// A path below a plain file does not exist either
fn is_missing(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory)
}

impl fmt::Display for FileSystemResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
