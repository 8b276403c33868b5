//! Helpers working over any [`Resource`] implementation

use std::io::{self, Read, Write};
use std::time::SystemTime;

use crate::Result;
use crate::resource::{Resource, ResourceType};

/// Read the whole content of a resource.
pub fn read_all<R: Resource>(res: &R) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    res.input()?.read_to_end(&mut content)?;
    Ok(content)
}

/// Replace the content of a resource, creating it if needed.
pub fn write_all<R: Resource>(res: &R, content: &[u8]) -> Result<()> {
    let mut out = res.out()?;
    out.write_all(content)?;
    // Surfaces storage errors that would otherwise only be logged on drop
    out.flush()?;
    Ok(())
}

/// Leaf children of `dir` modified strictly after `since`.
pub fn search<R: Resource>(dir: &R, since: SystemTime) -> Result<Vec<R>> {
    let mut found = Vec::new();
    for child in dir.list()?.unwrap_or_default() {
        if child.resource_type()? == ResourceType::Resource && child.last_modified()? > since {
            found.push(child);
        }
    }
    Ok(found)
}

/// Copy the tree under `src` to `dst`, possibly across store implementations.
///
/// Children rejected by `filter` are skipped along with everything below
/// them. Directories without any copied children are still created. Returns
/// the number of leaf resources copied.
pub fn copy_tree<S, D>(src: &S, dst: &D, filter: &dyn Fn(&S) -> bool) -> Result<usize>
where
    S: Resource,
    D: Resource,
{
    match src.resource_type()? {
        ResourceType::Undefined => Ok(0),
        ResourceType::Resource => {
            let mut input = src.input()?;
            let mut out = dst.out()?;
            io::copy(&mut input, &mut out)?;
            out.flush()?;
            tracing::debug!("Copied {} to {}", src.path(), dst.path());
            Ok(1)
        }
        ResourceType::Directory => {
            let children: Vec<S> = src
                .list()?
                .unwrap_or_default()
                .into_iter()
                .filter(|child| filter(child))
                .collect();
            if children.is_empty() {
                dst.dir()?;
                return Ok(0);
            }

            let mut copied = 0;
            for child in &children {
                copied += copy_tree(child, &dst.get(child.name()), filter)?;
            }
            Ok(copied)
        }
    }
}
