//! Local file cache for resources
//!
//! Materializes resource content under a base directory for callers that
//! need a real filesystem path. A cached file takes the modification time of
//! the resource it mirrors; it is refreshed only when the resource is newer.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::resource::{Resource, ResourceType};
use crate::{Error, Result, paths};

/// Source of local files for resources.
pub trait ResourceCache {
    /// Local path mirroring `res`, refreshed if stale.
    fn cache<R: Resource>(&self, res: &R) -> Result<PathBuf>;
}

/// Cache keeping one file per resource path under `base`.
///
/// No locking: concurrent refreshes of the same entry simply race and the
/// last writer wins.
#[derive(Debug, Clone)]
pub struct SimpleResourceCache {
    base: PathBuf,
}

impl SimpleResourceCache {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Local path for a resource path, whether cached or not.
    pub fn local_path(&self, path: &str) -> PathBuf {
        paths::names(path)
            .iter()
            .fold(self.base.clone(), |local, name| local.join(name))
    }
}

impl ResourceCache for SimpleResourceCache {
    fn cache<R: Resource>(&self, res: &R) -> Result<PathBuf> {
        let local = self.local_path(res.path());
        match res.resource_type()? {
            ResourceType::Directory => {
                fs::create_dir_all(&local)?;
                Err(Error::Unsupported(format!(
                    "caching directory {} (children are not materialized)",
                    res.path()
                )))
            }
            ResourceType::Undefined => {
                create_parent(&local)?;
                Ok(local)
            }
            ResourceType::Resource => {
                let remote_modified = res.last_modified()?;
                let stale = match fs::metadata(&local) {
                    Ok(meta) => meta.modified()? < remote_modified,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => true,
                    Err(e) => return Err(e.into()),
                };
                if stale {
                    tracing::debug!("Caching {} at {}", res.path(), local.display());
                    create_parent(&local)?;
                    copy_content(res, &local, remote_modified)?;
                } else {
                    tracing::debug!("Cache hit for {}", res.path());
                }
                Ok(local)
            }
        }
    }
}

fn create_parent(local: &Path) -> Result<()> {
    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn copy_content<R: Resource>(res: &R, local: &Path, modified: SystemTime) -> Result<()> {
    let mut input = res.input()?;
    let mut file = File::create(local)?;
    io::copy(&mut input, &mut file)?;
    // An unchanged resource must compare as fresh next time
    file.set_modified(modified)?;
    Ok(())
}
