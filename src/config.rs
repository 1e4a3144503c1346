//! Configuration management for crawlgate.
//!
//! Resolution order, lowest to highest: built-in defaults, a config file
//! (`crawlgate.toml` or `crawlgate.json`), environment variables, then
//! command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::repository::QueuePolicy;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "crawlgate.db";

/// Config file basenames looked for next to the data directory.
const CONFIG_BASENAMES: [&str; 2] = ["crawlgate", "config"];
const CONFIG_EXTENSIONS: [&str; 2] = ["toml", "json"];

/// Site lease tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Lock lifetime granted by `site lease`.
    pub ttl_secs: u64,
    /// How long a manual trigger keeps a site leasable.
    pub manual_trigger_window_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            manual_trigger_window_secs: 15 * 60,
        }
    }
}

/// Scrape queue tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_attempts: u32,
    pub stale_after_hours: u64,
    pub lookahead_factor: usize,
    /// Cap adopted by domains with no configured limit.
    pub default_max_per_minute: u32,
    /// `processing` rows older than this are reclaimed.
    pub processing_expiry_secs: u64,
    /// Default `queue lease` batch size.
    pub batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stale_after_hours: 48,
            lookahead_factor: 3,
            default_max_per_minute: 30,
            processing_expiry_secs: 10 * 60,
            batch_size: 10,
        }
    }
}

/// Maintenance daemon tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub interval_secs: u64,
    /// Run a dedupe pass every N cycles; 0 disables it.
    pub dedupe_every: u32,
    /// Stale-marked rows purged per cycle.
    pub purge_batch: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            dedupe_every: 0,
            purge_batch: 500,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// SQLite URL (`sqlite:/path/to.db`); overrides data_dir/database_filename.
    pub database_url: Option<String>,
    pub lease: LeaseConfig,
    pub queue: QueueConfig,
    pub daemon: DaemonConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Platform data dir, then home, then CWD.
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("crawlgate");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            lease: LeaseConfig::default(),
            queue: QueueConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

/// Strip a `sqlite:` / `sqlite://` scheme, returning the file path.
pub fn sqlite_path_from_url(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let rest = rest.split('?').next().unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some(PathBuf::from(shellexpand::tilde(rest).as_ref()))
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Full path to the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.database_url
            .as_deref()
            .and_then(sqlite_path_from_url)
            .unwrap_or_else(|| self.data_dir.join(&self.database_filename))
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure the directory holding the database exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        let db_path = self.database_path();
        let dir = db_path.parent().unwrap_or(&self.data_dir);
        fs::create_dir_all(dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("Failed to create data directory '{}': {}", dir.display(), e),
            )
        })
    }

    pub fn lease_ttl_ms(&self) -> i64 {
        secs_to_ms(self.lease.ttl_secs)
    }

    pub fn manual_trigger_window_ms(&self) -> i64 {
        secs_to_ms(self.lease.manual_trigger_window_secs)
    }

    pub fn processing_expiry_ms(&self) -> i64 {
        secs_to_ms(self.queue.processing_expiry_secs)
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        QueuePolicy {
            max_attempts: self.queue.max_attempts.max(1),
            stale_after_ms: secs_to_ms(self.queue.stale_after_hours.saturating_mul(3600)),
            lookahead_factor: self.queue.lookahead_factor.max(1),
        }
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    /// Falls back to defaults when no config file is found.
    pub async fn load() -> Self {
        match prefer::load("crawlgate").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => load_or_default(path),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// TOML for `.toml` files, JSON otherwise.
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// `~` is expanded; relative paths are joined onto `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        settings.lease = self.lease.clone();
        settings.queue = self.queue.clone();
        settings.daemon = self.daemon.clone();
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of the config file's directory.
    pub use_cwd: bool,
    /// Data directory or database file (`--data` flag).
    pub data: Option<PathBuf>,
}

fn is_db_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
        || path.is_file()
}

fn absolutize(path: &Path) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(expanded)
    }
}

/// Look for a config file next to the data directory.
fn find_config_next_to_db(data_dir: &Path) -> Option<PathBuf> {
    for basename in CONFIG_BASENAMES {
        for ext in CONFIG_EXTENSIONS {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

fn load_or_default(path: &Path) -> Config {
    match Config::load_from_path(path) {
        Ok(config) => {
            tracing::debug!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            tracing::warn!("Ignoring config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Pick the config file: explicit flag, next to the data dir, then
/// whatever `prefer` discovers in the standard locations.
async fn load_file_config(options: &LoadOptions, data_dir: Option<&Path>) -> Config {
    if let Some(ref path) = options.config_path {
        return load_or_default(path);
    }

    if let Some(path) = data_dir.and_then(find_config_next_to_db) {
        tracing::debug!("Found config next to data dir: {}", path.display());
        return load_or_default(&path);
    }

    Config::load().await
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Load settings with explicit options.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let data_override = options.data.as_deref().map(absolutize);
    let data_dir_override = data_override.as_ref().map(|p| {
        if is_db_file(p) {
            p.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            p.clone()
        }
    });
    let env_data_dir = env_var("CRAWLGATE_DATA_DIR").map(|d| absolutize(Path::new(&d)));

    let config = load_file_config(
        &options,
        data_dir_override.as_deref().or(env_data_dir.as_deref()),
    )
    .await;

    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(dir) = env_data_dir {
        tracing::debug!("Using CRAWLGATE_DATA_DIR: {}", dir.display());
        settings.data_dir = dir;
    }
    if let Some(database) = env_var("CRAWLGATE_DATABASE") {
        settings.database_filename = database;
    }
    if let Some(url) = env_var("DATABASE_URL") {
        if sqlite_path_from_url(&url).is_some() {
            tracing::debug!("Using DATABASE_URL from environment: {}", url);
            settings.database_url = Some(url);
        } else {
            tracing::warn!("Ignoring DATABASE_URL '{}': only sqlite: URLs are supported", url);
        }
    }

    // --data wins over everything.
    if let Some(path) = data_override {
        if is_db_file(&path) {
            settings.database_filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_DATABASE_FILENAME)
                .to_string();
        }
        if let Some(dir) = data_dir_override {
            settings.data_dir = dir;
        }
        settings.database_url = None;
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawlgate.toml");
        fs::write(
            &path,
            r#"
            data_dir = "./state"

            [lease]
            ttl_secs = 120

            [queue]
            max_attempts = 5
            default_max_per_minute = 2
            "#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.lease.ttl_secs, 120);
        assert_eq!(config.lease.manual_trigger_window_secs, 900);
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.stale_after_hours, 48);

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.data_dir, dir.path().join("state"));
        assert_eq!(settings.lease_ttl_ms(), 120_000);
        assert_eq!(settings.queue_policy().max_attempts, 5);
        assert_eq!(
            settings.database_path(),
            dir.path().join("state").join(DEFAULT_DATABASE_FILENAME)
        );
    }

    #[test]
    fn json_config_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawlgate.json");
        fs::write(&path, r#"{"daemon": {"interval_secs": 5, "dedupe_every": 10}}"#).unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.daemon.interval_secs, 5);
        assert_eq!(config.daemon.dedupe_every, 10);
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));
    }

    #[test]
    fn bad_config_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawlgate.toml");
        fs::write(&path, "lease = 3").unwrap();
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.contains("TOML"), "{err}");
    }

    #[tokio::test]
    async fn explicit_config_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[lease]\nttl_secs = 42\n").unwrap();

        let (settings, config) = load_settings_with_options(LoadOptions {
            config_path: Some(path.clone()),
            ..Default::default()
        })
        .await;
        assert_eq!(config.source_path, Some(path));
        assert_eq!(settings.lease_ttl_ms(), 42_000);
    }

    #[tokio::test]
    async fn config_next_to_data_dir_is_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("crawlgate.toml"),
            "[queue]\nbatch_size = 7\n",
        )
        .unwrap();

        let (settings, config) = load_settings_with_options(LoadOptions {
            data: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .await;
        assert_eq!(
            config.source_path,
            Some(dir.path().join("crawlgate.toml"))
        );
        assert_eq!(settings.queue.batch_size, 7);
        assert_eq!(settings.data_dir, dir.path());
    }

    #[test]
    fn sqlite_urls_resolve_to_paths() {
        assert_eq!(
            sqlite_path_from_url("sqlite:/var/lib/crawl.db"),
            Some(PathBuf::from("/var/lib/crawl.db"))
        );
        assert_eq!(
            sqlite_path_from_url("sqlite:///var/lib/crawl.db?mode=rwc"),
            Some(PathBuf::from("/var/lib/crawl.db"))
        );
        assert_eq!(sqlite_path_from_url("postgres://db/crawl"), None);

        let settings = Settings {
            database_url: Some("sqlite:/tmp/x.db".into()),
            ..Settings::with_data_dir(PathBuf::from("/data"))
        };
        assert_eq!(settings.database_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn queue_policy_conversion() {
        let settings = Settings::default();
        let policy = settings.queue_policy();
        assert_eq!(policy, QueuePolicy::default());
        assert_eq!(settings.processing_expiry_ms(), 600_000);
        assert_eq!(settings.manual_trigger_window_ms(), 900_000);
    }
}
