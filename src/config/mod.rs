//! Configuration management.
//!
//! Configuration is read from a TOML file, with `RESEARCH_HARVEST__<SECTION>__<KEY>`
//! environment variables layered on top.
//!
//! # Configuration File Format
//!
//! ```toml
//! [resolver]
//! email = "me@example.org"
//!
//! [mirrors]
//! hosts = ["sci-hub.se", "https://sci-hub.st"]
//!
//! [downloads]
//! directory = "~/literature/pdfs"
//!
//! [http]
//! timeout_secs = 15
//! max_retries = 3
//!
//! [search]
//! page_size = 10
//!
//! [zotero]
//! api_key = "..."
//! group_id = "5120604"
//!
//! [logging]
//! level = "info"
//! file = "literature.log"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::RetryConfig;

/// File name looked up in the working directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "research-harvest.toml";

/// Prefix for environment overrides
const ENV_PREFIX: &str = "RESEARCH_HARVEST";

/// Default identifying user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) LiteratureResearchBot/1.0";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Open-access resolver (Unpaywall) settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Fallback mirror hosts, tried in order
    #[serde(default)]
    pub mirrors: MirrorsConfig,

    /// Download settings
    #[serde(default)]
    pub downloads: DownloadConfig,

    /// Shared HTTP session settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Search paginator settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Reference manager settings
    #[serde(default)]
    pub zotero: ZoteroConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Open-access resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Contact address required by the resolver API. Absent disables the resolver stage.
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default = "default_resolver_url")]
    pub base_url: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            email: None,
            base_url: default_resolver_url(),
        }
    }
}

impl ResolverConfig {
    /// The configured contact address, ignoring blank values
    pub fn contact_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

fn default_resolver_url() -> String {
    "https://api.unpaywall.org/v2".to_string()
}

/// Mirror configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorsConfig {
    /// Hosts or base URLs; bare hosts are given an `https://` scheme
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory PDFs are written to
    #[serde(default = "default_download_dir")]
    pub directory: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: default_download_dir(),
        }
    }
}

impl DownloadConfig {
    /// The download directory with a leading `~` expanded
    pub fn resolved_directory(&self) -> PathBuf {
        expand_tilde(&self.directory)
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./pdfs")
}

/// HTTP session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Exponential backoff factor in seconds
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .max_retries(self.max_retries)
            .backoff_factor(self.backoff_factor)
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    0.75
}

/// Search paginator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub base_url: String,

    /// Results per page; the offset advances by this much
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Consecutive failures tolerated before pagination is abandoned
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Unit of the `2^attempt` backoff, in milliseconds
    #[serde(default = "default_backoff_unit")]
    pub backoff_unit_ms: u64,

    /// Ceiling for rate-limit backoff, in seconds
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,

    /// Random jitter added to rate-limit backoff
    #[serde(default = "default_jitter_min")]
    pub jitter_min_ms: u64,

    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: u64,

    /// Random pause between successful pages
    #[serde(default = "default_politeness_min")]
    pub politeness_min_ms: u64,

    #[serde(default = "default_politeness_max")]
    pub politeness_max_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
            page_size: default_page_size(),
            max_attempts: default_max_attempts(),
            backoff_unit_ms: default_backoff_unit(),
            backoff_cap_secs: default_backoff_cap(),
            jitter_min_ms: default_jitter_min(),
            jitter_max_ms: default_jitter_max(),
            politeness_min_ms: default_politeness_min(),
            politeness_max_ms: default_politeness_max(),
        }
    }
}

impl SearchConfig {
    /// Settings with every pause set to zero, for tests against local servers
    pub fn without_delays(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            backoff_unit_ms: 0,
            backoff_cap_secs: 0,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            politeness_min_ms: 0,
            politeness_max_ms: 0,
            ..Self::default()
        }
    }
}

fn default_search_url() -> String {
    "https://scholar.google.com/scholar".to_string()
}

fn default_page_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_unit() -> u64 {
    1000
}

fn default_backoff_cap() -> u64 {
    30
}

fn default_jitter_min() -> u64 {
    200
}

fn default_jitter_max() -> u64 {
    1500
}

fn default_politeness_min() -> u64 {
    1000
}

fn default_politeness_max() -> u64 {
    2000
}

/// Reference manager (zotero-cli) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoteroConfig {
    /// Executable to invoke
    #[serde(default = "default_zotero_cli")]
    pub cli: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub group_id: Option<String>,

    /// Config file forwarded to the CLI with `--config`
    #[serde(default)]
    pub config: Option<PathBuf>,

    /// Collection used when none is given on the command line
    #[serde(default)]
    pub collection: Option<String>,
}

impl Default for ZoteroConfig {
    fn default() -> Self {
        Self {
            cli: default_zotero_cli(),
            api_key: None,
            user_id: None,
            group_id: None,
            config: None,
            collection: None,
        }
    }
}

fn default_zotero_cli() -> String {
    "zotero-cli".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file, appended to in addition to stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// The log file with a leading `~` expanded
    pub fn resolved_file(&self) -> Option<PathBuf> {
        self.file.as_deref().map(expand_tilde)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration errors. These are the only errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Load configuration from a file, applying environment overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let path = expand_tilde(path);
    if !path.is_file() {
        return Err(ConfigError::NotFound(path));
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(path.as_path()))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Look for a config file in the working directory, then the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("research-harvest").join("config.toml"))
        .filter(|path| path.is_file())
}

/// The explicitly given file, or the first one [`find_config_file`] finds.
///
/// Having no configuration file at all is an error.
pub fn locate_config(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => find_config_file()
            .ok_or_else(|| ConfigError::NotFound(PathBuf::from(CONFIG_FILE_NAME))),
    }
}

/// Locate and load the configuration, returning the file it came from
pub fn resolve_config(explicit: Option<&Path>) -> Result<(Config, PathBuf), ConfigError> {
    let path = locate_config(explicit)?;
    let config = load_config(&path)?;
    Ok((config, path))
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
