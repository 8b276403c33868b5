use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::storage::{DEFAULT_POOL_SIZE, schema};

/// Configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "resource-store.toml";

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "RESOURCE_STORE_CONFIG";
/// Environment variable naming the database, overriding the data directory.
pub const DATABASE_ENV: &str = "RESOURCE_STORE_DATABASE";
pub const INITDB_ENV: &str = "RESOURCE_STORE_INITDB";
pub const IMPORT_ENV: &str = "RESOURCE_STORE_IMPORT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub enabled: bool,
    /// SQLite database file, or `:memory:`
    pub database: String,
    /// Driver name the traversal dialect is picked from
    pub driver: String,
    pub init_db: bool,
    pub init_script: Option<PathBuf>,
    pub import: bool,
    pub import_dir: Option<PathBuf>,
    pub import_excludes: Vec<String>,
    pub cache_dir: PathBuf,
    pub pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: "resource-store.db".to_string(),
            driver: "sqlite".to_string(),
            init_db: true,
            init_script: None,
            import: false,
            import_dir: None,
            import_excludes: Vec::new(),
            cache_dir: PathBuf::from("cache"),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl StoreConfig {
    pub fn is_memory(&self) -> bool {
        self.database == ":memory:"
    }

    /// Resolve relative locations against `base`.
    pub fn resolve(mut self, base: &Path) -> Self {
        if !self.is_memory() && Path::new(&self.database).is_relative() {
            self.database = base.join(&self.database).to_string_lossy().into_owned();
        }
        if self.cache_dir.is_relative() {
            self.cache_dir = base.join(&self.cache_dir);
        }
        self.init_script = self.init_script.map(|p| resolve_path(base, p));
        self.import_dir = self.import_dir.map(|p| resolve_path(base, p));
        self
    }
}

fn resolve_path(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() { base.join(path) } else { path }
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// File named by the config environment variable
    EnvFile(PathBuf),
    /// Database named by the database environment variable
    Env,
    /// Configuration file in the data directory
    DataDir(PathBuf),
    /// Built-in defaults, freshly written to the data directory
    Defaults(PathBuf),
    /// File given explicitly on the command line
    Explicit(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::EnvFile(path) => write!(f, "{} (from {})", path.display(), CONFIG_ENV),
            ConfigSource::Env => write!(f, "environment ({})", DATABASE_ENV),
            ConfigSource::DataDir(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults(path) => write!(f, "defaults (written to {})", path.display()),
            ConfigSource::Explicit(path) => write!(f, "{}", path.display()),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    PathBuf::from(".resource-store")
}

pub fn default_config_path_in(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Read a configuration file, leaving paths unresolved.
pub fn load_config_file(path: &Path) -> anyhow::Result<StoreConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("could not read config {}", path.display()))?;
    let config: StoreConfig =
        toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Load the configuration for `data_dir` from the process environment.
pub fn load_config(data_dir: &Path) -> anyhow::Result<(StoreConfig, ConfigSource)> {
    load_config_with(data_dir, |key| std::env::var(key).ok())
}

/// Load the configuration, looking in order at:
///
/// 1. a file named by [`CONFIG_ENV`] (skipped with a warning if unreadable)
/// 2. a database named by [`DATABASE_ENV`], with [`INITDB_ENV`] and [`IMPORT_ENV`]
/// 3. [`CONFIG_FILE`] in the data directory
/// 4. the defaults, which are then written to the data directory along with
///    the init and drop scripts
///
/// Relative paths are resolved against the data directory.
pub fn load_config_with<F>(data_dir: &Path, env: F) -> anyhow::Result<(StoreConfig, ConfigSource)>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(file) = env(CONFIG_ENV) {
        let path = PathBuf::from(file);
        match load_config_file(&path) {
            Ok(config) => return Ok((config.resolve(data_dir), ConfigSource::EnvFile(path))),
            Err(e) => tracing::warn!("Skipping config from {}: {:#}", CONFIG_ENV, e),
        }
    }

    if let Some(database) = env(DATABASE_ENV) {
        let defaults = StoreConfig::default();
        let config = StoreConfig {
            database,
            init_db: env(INITDB_ENV).map_or(Ok(defaults.init_db), |v| parse_flag(INITDB_ENV, &v))?,
            import: env(IMPORT_ENV).map_or(Ok(defaults.import), |v| parse_flag(IMPORT_ENV, &v))?,
            ..defaults
        };
        return Ok((config.resolve(data_dir), ConfigSource::Env));
    }

    let path = default_config_path_in(data_dir);
    if path.exists() {
        let config = load_config_file(&path)?;
        return Ok((config.resolve(data_dir), ConfigSource::DataDir(path)));
    }

    let config = StoreConfig::default();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("could not create data directory {}", data_dir.display()))?;
    write_config(&path, &config, false)?;
    write_scripts(data_dir)?;
    tracing::info!("Wrote default configuration to {}", path.display());
    Ok((config.resolve(data_dir), ConfigSource::Defaults(path)))
}

fn parse_flag(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got {:?}", name, other),
    }
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Write the schema scripts to `<data_dir>/scripts/`, keeping existing ones.
pub fn write_scripts(data_dir: &Path) -> anyhow::Result<()> {
    let scripts = data_dir.join("scripts");
    std::fs::create_dir_all(&scripts)?;
    for (name, contents) in [("init.sql", schema::init_script()), ("drop.sql", schema::DROP_SCRIPT.to_string())] {
        let path = scripts.join(name);
        if !path.exists() {
            std::fs::write(&path, contents)?;
        }
    }
    Ok(())
}
