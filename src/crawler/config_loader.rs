use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::crawler::cli::Cli;
use crate::crawler::site::{Engine, Site};

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Whether the browser window is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeadlessMode {
    /// Headless only for full-resolution crawls
    #[default]
    Auto,
    True,
    False,
}

impl HeadlessMode {
    pub fn resolve(self, full_resolution: bool) -> bool {
        match self {
            HeadlessMode::Auto => full_resolution,
            HeadlessMode::True => true,
            HeadlessMode::False => false,
        }
    }
}

// Config structs for config.toml
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Paths {
    pub download_directory: String,
    pub keywords_file: String,
    pub log_directory: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Logging {
    pub log_level: String,
    pub log_format: String, // "line" or "json"
    pub log_to_terminal: bool,
    pub log_to_file: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CrawlSettings {
    pub skip_existing: bool,
    pub threads: usize,
    pub google: bool,
    pub naver: bool,
    pub full_resolution: bool,
    pub face: bool,
    pub headless: HeadlessMode,
    pub limit: usize,
    pub proxies: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub chrome_args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PacingSettings {
    pub page_load_ms: u64,
    pub scroll_step_ms: u64,
    pub poll_interval_ms: u64,
    pub viewer_wait_ms: u64,
    pub click_wait_ms: u64,
    pub click_retries: usize,
    pub refresh_settle_ms: u64,
    pub after_click_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DownloadSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PoolSettings {
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub paths: Paths,
    pub logging: Logging,
    pub crawl: CrawlSettings,
    pub browser: BrowserSettings,
    pub pacing: PacingSettings,
    pub download: DownloadSettings,
    pub pool: PoolSettings,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            download_directory: "download".to_string(),
            keywords_file: "keywords.txt".to_string(),
            log_directory: "logs".to_string(),
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "line".to_string(),
            log_to_terminal: true,
            log_to_file: true,
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            skip_existing: true,
            threads: 4,
            google: true,
            naver: true,
            full_resolution: false,
            face: false,
            headless: HeadlessMode::Auto,
            // 0 means no cap per keyword and site
            limit: 0,
            proxies: Vec::new(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            chrome_args: [
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-gpu",
                "--window-size=1920,1080",
                "--disable-extensions",
                "--disable-infobars",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            page_load_ms: 1000,
            scroll_step_ms: 200,
            poll_interval_ms: 100,
            viewer_wait_ms: 5000,
            click_wait_ms: 15000,
            click_retries: 3,
            refresh_settle_ms: 2000,
            after_click_ms: 1000,
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: format!("autocrawler/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { shutdown_grace_secs: 3 }
    }
}

/// How the config file was obtained. Loading runs before logging is set up,
/// so the outcome is reported afterwards through [`ConfigOrigin::log`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Loaded,
    Created,
    Restored {
        reason: String,
        backup_error: Option<String>,
        write_error: Option<String>,
    },
}

impl ConfigOrigin {
    pub fn log(&self, config_path: &Path) {
        match self {
            ConfigOrigin::Loaded => info!("Loaded config from {}", config_path.display()),
            ConfigOrigin::Created => {
                warn!("Config file not found: {}", config_path.display());
                info!("Created {} with default values", config_path.display());
            }
            ConfigOrigin::Restored {
                reason,
                backup_error,
                write_error,
            } => {
                error!("Failed to parse {}: {}", config_path.display(), reason);
                info!("Backed up old config and created new one with default values");
                if let Some(e) = backup_error {
                    warn!("Failed to backup old config: {}", e);
                }
                if let Some(e) = write_error {
                    error!("Failed to write new config file: {}", e);
                }
            }
        }
    }
}

/// Loads `config.toml`, creating it with defaults when missing.
///
/// A file that no longer parses is moved to `config.toml.backup` and replaced
/// with a fresh default file.
pub fn load_app_config(config_path: impl AsRef<Path>) -> ConfigResult<(AppConfig, ConfigOrigin)> {
    let config_path = config_path.as_ref();

    if !config_path.exists() {
        let default_config = AppConfig::default();
        write_config(config_path, &default_config)?;
        return Ok((default_config, ConfigOrigin::Created));
    }

    let content = fs::read_to_string(config_path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok((config, ConfigOrigin::Loaded)),
        Err(e) => {
            let backup_error = fs::rename(config_path, config_path.with_extension("toml.backup"))
                .err()
                .map(|e| e.to_string());

            let default_config = AppConfig::default();
            let write_error = write_config(config_path, &default_config).err().map(|e| e.to_string());

            let origin = ConfigOrigin::Restored {
                reason: e.to_string(),
                backup_error,
                write_error,
            };
            Ok((default_config, origin))
        }
    }
}

fn write_config(config_path: &Path, config: &AppConfig) -> ConfigResult<()> {
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(config_path, toml::to_string_pretty(config)?)?;
    Ok(())
}

/// Splits a comma separated proxy list, dropping blank entries.
pub fn parse_proxy_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Delays used while driving the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub page_load: Duration,
    pub scroll_step: Duration,
    pub poll_interval: Duration,
    pub viewer_wait: Duration,
    pub click_wait: Duration,
    pub click_retries: usize,
    pub refresh_settle: Duration,
    pub after_click: Duration,
}

impl From<&PacingSettings> for Pacing {
    fn from(s: &PacingSettings) -> Self {
        Self {
            page_load: Duration::from_millis(s.page_load_ms),
            scroll_step: Duration::from_millis(s.scroll_step_ms),
            poll_interval: Duration::from_millis(s.poll_interval_ms),
            viewer_wait: Duration::from_millis(s.viewer_wait_ms),
            click_wait: Duration::from_millis(s.click_wait_ms),
            click_retries: s.click_retries.max(1),
            refresh_settle: Duration::from_millis(s.refresh_settle_ms),
            after_click: Duration::from_millis(s.after_click_ms),
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::from(&PacingSettings::default())
    }
}

/// Effective run settings: the config file with command-line overrides applied.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub download_path: PathBuf,
    pub keywords_file: PathBuf,
    pub skip_existing: bool,
    pub threads: usize,
    pub engines: Vec<Engine>,
    pub full_resolution: bool,
    pub face: bool,
    pub headless: bool,
    pub limit: usize,
    pub proxies: Vec<String>,
    pub browser: BrowserSettings,
    pub pacing: Pacing,
    pub download_timeout: Duration,
    pub user_agent: String,
    pub shutdown_grace: Duration,
}

impl CrawlConfig {
    pub fn resolve(app: &AppConfig, cli: &Cli) -> ConfigResult<Self> {
        let crawl = &app.crawl;

        let threads = cli.threads.unwrap_or(crawl.threads);
        if threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".to_string()));
        }

        url::Url::parse(&app.browser.webdriver_url).map_err(|e| {
            ConfigError::Invalid(format!("webdriver_url '{}': {}", app.browser.webdriver_url, e))
        })?;

        let full_resolution = cli.full.unwrap_or(crawl.full_resolution);
        let headless = cli.no_gui.unwrap_or(crawl.headless).resolve(full_resolution);

        let mut engines = Vec::new();
        if cli.google.unwrap_or(crawl.google) {
            engines.push(Engine::Google);
        }
        if cli.naver.unwrap_or(crawl.naver) {
            engines.push(Engine::Naver);
        }

        let proxies = match &cli.proxy_list {
            Some(raw) => parse_proxy_list(raw),
            None => crawl
                .proxies
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
        };

        Ok(Self {
            download_path: cli
                .download_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(&app.paths.download_directory)),
            keywords_file: cli
                .keywords
                .clone()
                .unwrap_or_else(|| PathBuf::from(&app.paths.keywords_file)),
            skip_existing: cli.skip.unwrap_or(crawl.skip_existing),
            threads,
            engines,
            full_resolution,
            face: cli.face.unwrap_or(crawl.face),
            headless,
            limit: cli.limit.unwrap_or(crawl.limit),
            proxies,
            browser: app.browser.clone(),
            pacing: Pacing::from(&app.pacing),
            download_timeout: Duration::from_secs(app.download.timeout_secs),
            user_agent: app.download.user_agent.clone(),
            shutdown_grace: Duration::from_secs(app.pool.shutdown_grace_secs),
        })
    }

    /// Crawl variants run for every keyword.
    pub fn sites(&self) -> Vec<Site> {
        self.engines
            .iter()
            .map(|engine| Site::new(*engine, self.full_resolution))
            .collect()
    }

    /// Query fragment appended to the search URL for this site.
    pub fn modifier(&self, site: Site) -> &'static str {
        if self.face { site.face_modifier() } else { "" }
    }

    /// A proxy picked uniformly at random, if any are configured.
    pub fn random_proxy(&self) -> Option<&str> {
        self.proxies.choose(&mut rand::rng()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let (config, origin) = load_app_config(&path).unwrap();
        assert_eq!(origin, ConfigOrigin::Created);
        assert!(path.exists());
        assert_eq!(config.crawl.threads, 4);
        assert_eq!(config.paths.keywords_file, "keywords.txt");

        let (reloaded, origin) = load_app_config(&path).unwrap();
        assert_eq!(origin, ConfigOrigin::Loaded);
        assert_eq!(reloaded.browser, config.browser);
        assert_eq!(reloaded.pacing.click_retries, 3);
    }

    #[test]
    fn test_corrupt_file_is_backed_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[crawl\nthreads = ").unwrap();

        let (config, origin) = load_app_config(&path).unwrap();
        assert_eq!(config.crawl.threads, 4);
        assert!(dir.path().join("config.toml.backup").exists());
        assert!(matches!(
            origin,
            ConfigOrigin::Restored { backup_error: None, write_error: None, .. }
        ));
        assert!(toml::from_str::<AppConfig>(&fs::read_to_string(&path).unwrap()).is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[crawl]\nthreads = 2\nheadless = \"true\"\n").unwrap();

        let (config, _) = load_app_config(&path).unwrap();
        assert_eq!(config.crawl.threads, 2);
        assert_eq!(config.crawl.headless, HeadlessMode::True);
        assert!(config.crawl.google);
        assert_eq!(config.pacing.page_load_ms, 1000);
    }

    #[test]
    fn test_cli_overrides_config() {
        let app = AppConfig::default();
        let cli = Cli {
            threads: Some(9),
            naver: Some(false),
            full: Some(true),
            limit: Some(5),
            proxy_list: Some(" a:1, ,b:2,".to_string()),
            ..Cli::default()
        };

        let config = CrawlConfig::resolve(&app, &cli).unwrap();
        assert_eq!(config.threads, 9);
        assert_eq!(config.engines, vec![Engine::Google]);
        assert_eq!(config.sites(), vec![Site::GoogleFullRes]);
        assert_eq!(config.limit, 5);
        assert_eq!(config.proxies, vec!["a:1".to_string(), "b:2".to_string()]);
        // auto headless follows full-resolution mode
        assert!(config.headless);
    }

    #[test]
    fn test_headless_resolution() {
        assert!(!HeadlessMode::Auto.resolve(false));
        assert!(HeadlessMode::Auto.resolve(true));
        assert!(HeadlessMode::True.resolve(false));
        assert!(!HeadlessMode::False.resolve(true));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let app = AppConfig::default();
        let cli = Cli { threads: Some(0), ..Cli::default() };
        assert!(matches!(CrawlConfig::resolve(&app, &cli), Err(ConfigError::Invalid(_))));

        let mut app = AppConfig::default();
        app.browser.webdriver_url = "not a url".to_string();
        assert!(CrawlConfig::resolve(&app, &Cli::default()).is_err());
    }

    #[test]
    fn test_face_modifier_and_proxy_choice() {
        let cli = Cli { face: Some(true), ..Cli::default() };
        let config = CrawlConfig::resolve(&AppConfig::default(), &cli).unwrap();
        assert_eq!(config.modifier(Site::NaverThumbnail), "&face=1");
        assert_eq!(config.random_proxy(), None);

        let cli = Cli { proxy_list: Some("only:1".to_string()), ..Cli::default() };
        let config = CrawlConfig::resolve(&AppConfig::default(), &cli).unwrap();
        assert_eq!(config.modifier(Site::NaverThumbnail), "");
        assert_eq!(config.random_proxy(), Some("only:1"));
    }
}
