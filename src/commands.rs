use crate::{OutputMode, emit_success};
use anyhow::Context as _;
use indicatif::HumanDuration;
use owo_colors::OwoColorize;
use resource_store::config::{self, ConfigSource, StoreConfig};
use resource_store::resources::{read_all, write_all};
use resource_store::ui::{
    banner, human_bytes, info, listing_table, muted, resource_icon, stats_table, status, success, theme, Icons,
    ListingRow, Spinner,
};
use resource_store::{Resource, ResourceStore, ResourceType, SqlResource, SqlResourceStore};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Settings shared by every command
pub struct Context {
    pub output_mode: OutputMode,
    pub data_dir: PathBuf,
    pub config: Option<PathBuf>,
}

impl Context {
    fn load_config(&self) -> anyhow::Result<(StoreConfig, ConfigSource)> {
        match &self.config {
            Some(path) => {
                let config = config::load_config_file(path)?.resolve(&self.data_dir);
                Ok((config, ConfigSource::Explicit(path.clone())))
            }
            None => config::load_config(&self.data_dir),
        }
    }

    fn open_store(&self) -> anyhow::Result<(SqlResourceStore, StoreConfig)> {
        let (config, source) = self.load_config()?;
        tracing::debug!("Using configuration from {}", source);
        if !config.enabled {
            anyhow::bail!("resource store is disabled in {}", source);
        }
        let store = SqlResourceStore::open(&config)
            .with_context(|| format!("could not open resource store {}", config.database))?;
        Ok((store, config))
    }
}

fn kind_of(res: &SqlResource) -> anyhow::Result<ResourceType> {
    Ok(res.resource_type()?)
}

fn ago(time: SystemTime) -> String {
    match SystemTime::now().duration_since(time) {
        Ok(elapsed) => format!("{} ago", HumanDuration(elapsed)),
        Err(_) => "just now".to_string(),
    }
}

pub fn run_init(ctx: &Context, force: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(&ctx.data_dir)
        .with_context(|| format!("could not create data directory {}", ctx.data_dir.display()))?;
    let path = config::default_config_path_in(&ctx.data_dir);
    if force || !path.exists() {
        config::write_config(&path, &StoreConfig::default(), force)?;
    }
    config::write_scripts(&ctx.data_dir)?;

    let (store, config) = ctx.open_store()?;
    let stats = store.stats()?;

    if ctx.output_mode.is_human() {
        success("Resource store ready");
        status(Icons::GEAR, "Config", &path.display().to_string());
        status(Icons::DATABASE, "Database", &config.database);
        status(Icons::PACKAGE, "Dialect", store.dialect().as_str());
        status(Icons::FOLDER, "Cache", &config.cache_dir.display().to_string());
        status(Icons::STATS, "Resources", &stats.resources.to_string());
    } else {
        let data = serde_json::json!({
            "config": path,
            "database": config.database,
            "dialect": store.dialect().as_str(),
            "cache_dir": config.cache_dir,
            "resources": stats.resources,
        });
        emit_success(ctx.output_mode, "init", data)?;
    }
    Ok(())
}

pub fn run_ls(ctx: &Context, path: &str, filter: Option<&str>) -> anyhow::Result<()> {
    let (store, _) = ctx.open_store()?;
    let dir = store.get(path);
    let pattern = filter
        .map(glob::Pattern::new)
        .transpose()
        .with_context(|| format!("invalid filter {:?}", filter.unwrap_or_default()))?;

    let Some(children) = dir.list()? else {
        anyhow::bail!("{} is not a directory", dir.path());
    };

    let mut entries = Vec::new();
    for child in children {
        if pattern.as_ref().is_some_and(|p| !p.matches(child.name())) {
            continue;
        }
        let kind = kind_of(&child)?;
        let size = child.size()?;
        entries.push((child, kind, size));
    }

    if ctx.output_mode.is_human() {
        if entries.is_empty() {
            println!("{}", muted("(empty)"));
            return Ok(());
        }
        let mut rows = Vec::with_capacity(entries.len());
        for (child, kind, size) in &entries {
            let name = match kind {
                ResourceType::Directory => format!("{}/", child.name()).style(theme().directory.clone()).to_string(),
                _ => child.name().to_string(),
            };
            rows.push(ListingRow {
                icon: resource_icon(*kind).to_string(),
                name,
                size: size.map(human_bytes).unwrap_or_default(),
                modified: ago(child.last_modified()?),
            });
        }
        println!("{}", listing_table(&rows));
    } else {
        let items: Vec<_> = entries
            .iter()
            .map(|(child, kind, size)| {
                serde_json::json!({
                    "path": child.path(),
                    "type": kind.as_str(),
                    "size": size,
                })
            })
            .collect();
        emit_success(ctx.output_mode, "ls", serde_json::json!({ "path": dir.path(), "children": items }))?;
    }
    Ok(())
}

pub fn run_cat(ctx: &Context, path: &str) -> anyhow::Result<()> {
    let (store, _) = ctx.open_store()?;
    let res = store.get(path);
    if kind_of(&res)? == ResourceType::Undefined {
        anyhow::bail!("{} does not exist", res.path());
    }
    let content = read_all(&res)?;

    if ctx.output_mode.is_human() {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&content)?;
        stdout.flush()?;
    } else {
        let data = serde_json::json!({
            "path": res.path(),
            "content": String::from_utf8_lossy(&content),
        });
        emit_success(ctx.output_mode, "cat", data)?;
    }
    Ok(())
}

pub fn run_put(ctx: &Context, path: &str, from: Option<&Path>) -> anyhow::Result<()> {
    let content = match from {
        Some(file) => std::fs::read(file).with_context(|| format!("could not read {}", file.display()))?,
        None => {
            let mut content = Vec::new();
            std::io::stdin().lock().read_to_end(&mut content)?;
            content
        }
    };

    let (store, _) = ctx.open_store()?;
    let res = store.get(path);
    let created = kind_of(&res)? == ResourceType::Undefined;
    write_all(&res, &content)?;

    if ctx.output_mode.is_human() {
        let icon = if created { Icons::NEW } else { Icons::FILE };
        status(icon, res.path(), &human_bytes(content.len() as u64));
    } else {
        let data = serde_json::json!({
            "path": res.path(),
            "bytes": content.len(),
            "created": created,
        });
        emit_success(ctx.output_mode, "put", data)?;
    }
    Ok(())
}

pub fn run_mkdir(ctx: &Context, path: &str) -> anyhow::Result<()> {
    let (store, _) = ctx.open_store()?;
    let res = store.get(path);
    let local = res.dir()?;

    if ctx.output_mode.is_human() {
        status(Icons::FOLDER, res.path(), &muted(&local.display().to_string()));
    } else {
        emit_success(ctx.output_mode, "mkdir", serde_json::json!({ "path": res.path(), "local": local }))?;
    }
    Ok(())
}

pub fn run_rm(ctx: &Context, path: &str) -> anyhow::Result<()> {
    let (store, _) = ctx.open_store()?;
    let removed = store.remove(path)?;

    if ctx.output_mode.is_human() {
        if removed {
            status(Icons::DEL, "Removed", path);
        } else {
            resource_store::ui::warn(&format!("{} does not exist", path));
        }
    } else {
        emit_success(ctx.output_mode, "rm", serde_json::json!({ "path": path, "removed": removed }))?;
    }
    Ok(())
}

pub fn run_mv(ctx: &Context, from: &str, to: &str) -> anyhow::Result<()> {
    let (store, _) = ctx.open_store()?;
    let moved = store.move_to(from, to)?;

    if ctx.output_mode.is_human() {
        if moved {
            println!("{} {} {} {}", Icons::CHECK, from, Icons::RIGHT, to);
        } else {
            resource_store::ui::warn(&format!("{} does not exist", from));
        }
    } else {
        let data = serde_json::json!({ "from": from, "to": to, "moved": moved });
        emit_success(ctx.output_mode, "mv", data)?;
    }
    Ok(())
}

pub fn run_cache(ctx: &Context, path: &str) -> anyhow::Result<()> {
    let (store, _) = ctx.open_store()?;
    let res = store.get(path);
    let local = res.file()?;

    if ctx.output_mode.is_human() {
        println!("{}", local.display());
    } else {
        emit_success(ctx.output_mode, "cache", serde_json::json!({ "path": res.path(), "local": local }))?;
    }
    Ok(())
}

pub fn run_import(ctx: &Context, dir: &Path, exclude: &[String]) -> anyhow::Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }
    let (store, config) = ctx.open_store()?;
    let excludes: Vec<String> = config.import_excludes.iter().chain(exclude).cloned().collect();

    let spinner = ctx
        .output_mode
        .is_human()
        .then(|| Spinner::new(&format!("Importing {}", dir.display())));
    let count = match store.import(dir, &excludes) {
        Ok(count) => count,
        Err(e) => {
            if let Some(spinner) = &spinner {
                spinner.abandon();
            }
            return Err(e).with_context(|| format!("import of {} failed", dir.display()));
        }
    };

    match spinner {
        Some(spinner) => spinner.finish_with_summary(&format!("Imported {} resources", count)),
        None => emit_success(
            ctx.output_mode,
            "import",
            serde_json::json!({ "dir": dir, "imported": count }),
        )?,
    }
    Ok(())
}

pub fn run_stats(ctx: &Context) -> anyhow::Result<()> {
    let (store, config) = ctx.open_store()?;
    let stats = store.stats()?;

    if ctx.output_mode.is_human() {
        info("Database", &config.database);
        let directories = stats.directories.to_string();
        let resources = stats.resources.to_string();
        let bytes = human_bytes(stats.bytes);
        println!(
            "{}",
            stats_table(&[
                ("Dialect", store.dialect().as_str()),
                ("Directories", &directories),
                ("Resources", &resources),
                ("Content", &bytes),
            ])
        );
    } else {
        let data = serde_json::json!({
            "database": config.database,
            "dialect": store.dialect().as_str(),
            "directories": stats.directories,
            "resources": stats.resources,
            "bytes": stats.bytes,
        });
        emit_success(ctx.output_mode, "stats", data)?;
    }
    Ok(())
}

pub fn run_version(output_mode: OutputMode) -> anyhow::Result<()> {
    if output_mode.is_human() {
        banner(
            &format!("{}", "resource-store".bold().style(theme().info.clone())),
            &format!("Version {}", env!("CARGO_PKG_VERSION").bold()),
        );
    } else {
        let data = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        });
        emit_success(output_mode, "version", data)?;
    }
    Ok(())
}
