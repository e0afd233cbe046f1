//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a single TOML file. Values are resolved in
//! priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PCAT_CONFIG";
/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "PCAT_ROOT_FOLDER";

const DATABASE_FILE: &str = "pcat.db";
const CACHE_FILE: &str = "classification_cache.json";
const TAXONOMY_FILE: &str = "taxonomy.toml";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the database, classification cache and taxonomy file
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path (defaults to `<root>/pcat.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Explicit classification cache path (defaults to `<root>/classification_cache.json`)
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// Explicit taxonomy path (defaults to `<root>/taxonomy.toml`)
    #[serde(default)]
    pub taxonomy_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub classifier: ClassifierSection,

    #[serde(default)]
    pub matching: MatchingSection,

    #[serde(default)]
    pub batch: BatchSection,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// AI classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSection {
    /// Classifier implementation: "llm", "local_llm" or "mock"
    #[serde(default = "default_classifier_kind")]
    pub kind: String,

    /// Service endpoint (base URL)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model name passed to the service
    #[serde(default)]
    pub model: Option<String>,

    /// API key for the remote service (prefer PCAT_CLASSIFIER_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Products per combined AI request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Smallest request worth sending on its own; smaller trailing groups are merged
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            kind: default_classifier_kind(),
            endpoint: None,
            model: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            requests_per_second: default_requests_per_second(),
            batch_size: default_batch_size(),
            min_batch_size: default_min_batch_size(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Similarity thresholds for the fuzzy and default tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingSection {
    /// Fuzzy tier keeps matches strictly above this score
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    /// Default tier lower bound (inclusive)
    #[serde(default = "default_similar_min")]
    pub similar_min: f64,

    /// Default tier upper bound (exclusive)
    #[serde(default = "default_similar_max")]
    pub similar_max: f64,

    /// Matches kept per tier
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Matches that vote on facet values in the fuzzy tier
    #[serde(default = "default_vote_pool")]
    pub vote_pool: usize,

    /// Minimum gate confidence for accepting an AI answer
    #[serde(default = "default_gate_threshold")]
    pub gate_threshold: f64,
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            similar_min: default_similar_min(),
            similar_max: default_similar_max(),
            top_k: default_top_k(),
            vote_pool: default_vote_pool(),
            gate_threshold: default_gate_threshold(),
        }
    }
}

/// Batch run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Accepted identifier lengths (digits)
    #[serde(default = "default_identifier_lengths")]
    pub identifier_lengths: Vec<usize>,

    /// Source order; sources not listed run afterwards when `run_remaining` is set
    #[serde(default)]
    pub source_order: Vec<String>,

    #[serde(default = "default_true")]
    pub run_remaining: bool,

    /// Remove persisted identifiers from the working set after a run
    #[serde(default)]
    pub remove_processed: bool,

    /// Preferred source order when picking finalized values
    #[serde(default)]
    pub source_priority: Vec<String>,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            identifier_lengths: default_identifier_lengths(),
            source_order: Vec::new(),
            run_remaining: true,
            remove_processed: false,
            source_priority: Vec::new(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_classifier_kind() -> String {
    "llm".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_requests_per_second() -> u32 {
    2
}
fn default_batch_size() -> usize {
    10
}
fn default_min_batch_size() -> usize {
    3
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    8000
}
fn default_fuzzy_threshold() -> f64 {
    75.0
}
fn default_similar_min() -> f64 {
    85.0
}
fn default_similar_max() -> f64 {
    95.0
}
fn default_top_k() -> usize {
    5
}
fn default_vote_pool() -> usize {
    3
}
fn default_gate_threshold() -> f64 {
    0.5
}
fn default_identifier_lengths() -> Vec<usize> {
    vec![12, 13]
}
fn default_true() -> bool {
    true
}
fn default_event_capacity() -> usize {
    256
}

/// Locate the config file
///
/// Priority: explicit path → `PCAT_CONFIG` → user config dir → `/etc/pcat/config.toml`.
/// Returns `None` when no file exists in any default location.
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("pcat").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/pcat/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load TOML configuration
///
/// An explicitly named file (argument or `PCAT_CONFIG`) must exist. When no file
/// is found in the default locations the built-in defaults are returned.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let explicit_requested = explicit.is_some() || std::env::var(CONFIG_ENV_VAR).is_ok();

    let Some(path) = locate_config_file(explicit) else {
        debug!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        if explicit_requested {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    write_atomically(path, content.as_bytes())
}

/// Write bytes to `path` via a sibling temp file and rename
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Root folder resolution
///
/// 1. Command-line argument
/// 2. `PCAT_ROOT_FOLDER`
/// 3. `root_folder` in the TOML config
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pcat"))
        .unwrap_or_else(|| PathBuf::from("./pcat_data"))
}

/// Resolved on-disk layout under the root folder
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
    database_path: Option<PathBuf>,
    cache_path: Option<PathBuf>,
    taxonomy_path: Option<PathBuf>,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf, config: &TomlConfig) -> Self {
        Self {
            root,
            database_path: config.database_path.clone(),
            cache_path: config.cache_path.clone(),
            taxonomy_path: config.taxonomy_path.clone(),
        }
    }

    /// Create the root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created root folder: {}", self.root.display());
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.root.join(DATABASE_FILE))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| self.root.join(CACHE_FILE))
    }

    pub fn taxonomy_path(&self) -> PathBuf {
        self.taxonomy_path
            .clone()
            .unwrap_or_else(|| self.root.join(TAXONOMY_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_thresholds() {
        let config = TomlConfig::default();
        assert_eq!(config.matching.fuzzy_threshold, 75.0);
        assert_eq!(config.matching.similar_min, 85.0);
        assert_eq!(config.matching.similar_max, 95.0);
        assert_eq!(config.matching.top_k, 5);
        assert_eq!(config.classifier.max_attempts, 3);
        assert_eq!(config.batch.identifier_lengths, vec![12, 13]);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            root_folder = "/tmp/pcat"

            [classifier]
            kind = "local_llm"
            batch_size = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/tmp/pcat")));
        assert_eq!(config.classifier.kind, "local_llm");
        assert_eq!(config.classifier.batch_size, 8);
        assert_eq!(config.classifier.min_batch_size, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    #[serial]
    fn test_cli_argument_wins_over_environment() {
        std::env::set_var(ROOT_FOLDER_ENV_VAR, "/from/env");
        let config = TomlConfig::default();

        let root = resolve_root_folder(Some(Path::new("/from/cli")), &config);
        assert_eq!(root, PathBuf::from("/from/cli"));

        let root = resolve_root_folder(None, &config);
        assert_eq!(root, PathBuf::from("/from/env"));

        std::env::remove_var(ROOT_FOLDER_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_toml_root_used_without_env() {
        std::env::remove_var(ROOT_FOLDER_ENV_VAR);
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));
    }

    #[test]
    #[serial]
    fn test_explicit_missing_file_is_error() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_toml_config(Some(&missing)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_write_then_load_roundtrip() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = TomlConfig::default();
        config.classifier.kind = "mock".to_string();
        config.batch.source_order = vec!["chewy".to_string(), "petco".to_string()];
        write_toml_config(&config, &path).unwrap();

        let loaded = load_toml_config(Some(&path)).unwrap();
        assert_eq!(loaded.classifier.kind, "mock");
        assert_eq!(loaded.batch.source_order, config.batch.source_order);
    }

    #[test]
    fn test_layout_honours_overrides() {
        let config = TomlConfig {
            cache_path: Some(PathBuf::from("/elsewhere/cache.json")),
            ..Default::default()
        };
        let layout = RootFolderInitializer::new(PathBuf::from("/root/pcat"), &config);
        assert_eq!(layout.database_path(), PathBuf::from("/root/pcat/pcat.db"));
        assert_eq!(layout.cache_path(), PathBuf::from("/elsewhere/cache.json"));
        assert_eq!(layout.taxonomy_path(), PathBuf::from("/root/pcat/taxonomy.toml"));
    }
}
