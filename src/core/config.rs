use crate::core::wait::WaitPolicy;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// Listing URL with `{page}` and `{per}` placeholders.
    pub list_url: String,
    /// Detail-page URL with an `{id}` placeholder.
    pub detail_url: String,
    pub page_size: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            list_url: "https://www.finanzfluss.de/informer/etf/suche?page={page}&per={per}"
                .to_string(),
            detail_url: "https://www.finanzfluss.de/informer/etf/{id}/".to_string(),
            page_size: 100,
        }
    }
}

impl SourceConfig {
    pub fn list_url(&self, page: u32) -> String {
        self.list_url
            .replace("{page}", &page.to_string())
            .replace("{per}", &self.page_size.to_string())
    }

    pub fn detail_url(&self, id: &str) -> String {
        self.detail_url.replace("{id}", id)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct BrowserSettings {
    /// Chrome/Chromium binary; detected on the `PATH` when unset.
    pub executable: Option<PathBuf>,
    /// Reusing a real profile keeps the consent state and avoids bot checks.
    pub user_data_dir: Option<PathBuf>,
    pub profile_directory: Option<String>,
    pub headless: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HarvestSettings {
    pub table_wait_ms: u64,
    pub anchor_wait_ms: u64,
    pub poll_interval_ms: u64,
    /// Attempts per listing page before the page is given up.
    pub max_page_attempts: u32,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        HarvestSettings {
            table_wait_ms: 10_000,
            anchor_wait_ms: 3_000,
            poll_interval_ms: 200,
            max_page_attempts: 5,
        }
    }
}

impl HarvestSettings {
    pub fn table_wait(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_millis(self.table_wait_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    pub fn anchor_wait(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_millis(self.anchor_wait_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub data_path: Option<String>,
    pub source: SourceConfig,
    pub browser: BrowserSettings,
    pub harvest: HarvestSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "fundharvest", "fundharvest")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("org", "fundharvest", "fundharvest")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// The configured database URL, or a SQLite file in the data directory.
    pub fn database_url(&self) -> Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        let data_path = self.default_data_path()?;
        fs::create_dir_all(&data_path).with_context(|| {
            format!("Failed to create data directory: {}", data_path.display())
        })?;
        Ok(format!("sqlite://{}", data_path.join("funds.db").display()))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
