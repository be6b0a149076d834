//! Configuration for a crawl run.
//!
//! Stored as TOML next to the data it drives. Every knob has a default so a
//! config file only needs to name the seed URL; `load_or_default` falls back
//! to pure defaults when no file is given.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// How content files are arranged beneath the output directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrganizeBy {
    Flat,
    Category,
    Type,
    Date,
}

/// Folder layout options for the file store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderOrganization {
    #[serde(default = "default_organize_by")]
    pub organize_by: OrganizeBy,
    /// Folder name used by the `category` layout. Derived from the seed URL
    /// when absent.
    #[serde(default)]
    pub category_folder_name: Option<String>,
    #[serde(default)]
    pub create_subfolders: bool,
}

impl Default for FolderOrganization {
    fn default() -> Self {
        Self {
            organize_by: default_organize_by(),
            category_folder_name: None,
            create_subfolders: false,
        }
    }
}

const fn default_organize_by() -> OrganizeBy {
    OrganizeBy::Flat
}

/// Settings for one crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Seed category URL. The only field without a usable default.
    pub start_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Floor between request starts, in seconds.
    #[serde(default = "default_request_delay")]
    pub request_delay: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_supported_languages")]
    pub supported_languages: Vec<String>,
    #[serde(default = "default_max_filename_length")]
    pub max_filename_length: usize,
    /// Articles whose cleaned Markdown trims below this many characters are
    /// rejected as processing errors.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub folder_organization: FolderOrganization,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./wikipedia_data")
}

const fn default_max_depth() -> u32 {
    5
}

const fn default_request_delay() -> f64 {
    1.0
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

fn default_supported_languages() -> Vec<String> {
    vec!["en".into(), "zh-cn".into(), "zh".into()]
}

const fn default_max_filename_length() -> usize {
    200
}

const fn default_min_content_length() -> usize {
    20
}

fn default_log_level() -> String {
    "info".into()
}

impl CrawlerConfig {
    /// Build a config with defaults for everything but the seed.
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            output_dir: default_output_dir(),
            max_depth: default_max_depth(),
            request_delay: default_request_delay(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            supported_languages: default_supported_languages(),
            max_filename_length: default_max_filename_length(),
            min_content_length: default_min_content_length(),
            log_level: default_log_level(),
            log_file: None,
            folder_organization: FolderOrganization::default(),
        }
    }

    /// Loads the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: CrawlerConfig = toml::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Persists the configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = toml::to_string_pretty(self)?;
        fs::write(path, data)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Validates the settings a run cannot start without.
    pub fn validate(&self) -> Result<()> {
        let parsed = Url::parse(&self.start_url)
            .with_context(|| format!("Invalid start URL: {}", self.start_url))?;
        if parsed.scheme() != "https" {
            anyhow::bail!("Start URL must use HTTPS: {}", self.start_url);
        }
        let host = parsed.host_str().unwrap_or_default();
        if !host.ends_with("wikipedia.org") {
            anyhow::bail!("Start URL must be a wikipedia.org host: {}", self.start_url);
        }
        if !parsed.path().starts_with("/wiki/") {
            anyhow::bail!("Start URL must point at a /wiki/ page: {}", self.start_url);
        }
        if self.request_delay < 0.0 {
            anyhow::bail!("Request delay must be non-negative");
        }
        if self.request_timeout == 0 {
            anyhow::bail!("Request timeout must be positive");
        }
        Ok(())
    }

    /// Folder name the `category` layout uses when none is configured,
    /// derived from the seed URL.
    pub fn category_folder_name(&self) -> String {
        if let Some(name) = &self.folder_organization.category_folder_name {
            return name.clone();
        }
        match self.start_url.split_once("Category:") {
            Some((_, category)) => {
                format!("Category_{}", category.replace("%20", "_").replace(' ', "_"))
            }
            None => "General_Crawl".into(),
        }
    }
}
