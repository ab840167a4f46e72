use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::deck::SortKey;
use crate::storage::DeckOrder;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "PokeDeck";
const APP_NAME: &str = "pokedeck";

pub const DEFAULT_CATALOG_URL: &str = "https://pokeapi.co/api/v2";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl ConfigPaths {
    /// Resolves XDG locations, honouring `POKEDECK_CONFIG` and `POKEDECK_DATA`.
    pub fn discover() -> Result<Self> {
        let override_config = env::var("POKEDECK_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("POKEDECK_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_dir = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let database_path = data_dir.join("deck.db");

        Ok(Self {
            config_dir,
            config_file,
            data_dir,
            database_path,
        })
    }

    /// Points the data directory (and database) somewhere else, as `--data-dir` does.
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.database_path = data_dir.join("deck.db");
        self.data_dir = data_dir;
        self
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub default_sort: SortPreference,
    pub catalog: CatalogOptions,
    pub storage: StorageOptions,
    pub tick_rate_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_sort: SortPreference::default(),
            catalog: CatalogOptions::default(),
            storage: StorageOptions::default(),
            tick_rate_ms: 250,
        }
    }
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        self.catalog.validate();
        if self.tick_rate_ms == 0 {
            tracing::warn!("tick_rate_ms must be positive, falling back to 250");
            self.tick_rate_ms = 250;
        }
        Ok(())
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogOptions {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl CatalogOptions {
    fn validate(&mut self) {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            tracing::warn!(
                fallback = DEFAULT_CATALOG_URL,
                "empty catalog base_url in config, using the default"
            );
            self.base_url = DEFAULT_CATALOG_URL.to_string();
        } else {
            self.base_url = trimmed.to_string();
        }
        if self.timeout_secs == 0 {
            tracing::warn!(
                "catalog timeout_secs must be positive, falling back to {DEFAULT_TIMEOUT_SECS}"
            );
            self.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SortPreference {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortPreference {
    fn default() -> Self {
        Self {
            key: SortKey::Name,
            direction: SortDirection::Ascending,
        }
    }
}

impl SortPreference {
    pub fn ascending(&self) -> bool {
        self.direction == SortDirection::Ascending
    }

    pub fn order(&self) -> DeckOrder {
        DeckOrder {
            key: self.key,
            ascending: self.ascending(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Ascending
    }
}
