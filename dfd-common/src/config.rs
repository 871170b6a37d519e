//! Bootstrap configuration loading and root folder resolution
//!
//! Resolution priority for every bootstrap value:
//! 1. Command-line argument (highest priority, applied by the binary)
//! 2. Environment variable
//! 3. TOML config file (`~/.config/dfd/<module>.toml`)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup: the loader logs a
//! warning and falls back to compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "DFD_ROOT_FOLDER";

/// Alternative, shorter root folder environment variable
pub const ROOT_ENV: &str = "DFD_ROOT";

/// Default HTTP port of the analysis service
pub const DEFAULT_PORT: u16 = 5780;

/// Upload size ceiling enforced by the input gate (100 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Evaluators run by the reference analysis, in evaluation order
pub const DEFAULT_EVALUATORS: [&str; 5] = [
    "FaceForensics++",
    "Capsule-Forensics",
    "DeepFakes Detection",
    "Face X-ray",
    "CNNDetection",
];

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/dfd
        dirs::data_local_dir()
            .map(|d| d.join("dfd"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/dfd"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("dfd"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/dfd"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("dfd"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\dfd"))
    } else {
        PathBuf::from("./dfd_data")
    }
}

/// Per-module TOML config file path (`<config dir>/dfd/<module>.toml`)
pub fn config_file_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dfd").join(format!("{}.toml", module_name)))
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
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

fn default_log_level() -> String {
    CompiledDefaults::for_current_platform().log_level
}

/// What the evaluator-sequence driver does when one evaluator pass fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run and return the workflow to idle
    #[default]
    Abort,
    /// Record a zero-confidence "no result" verdict and continue
    Substitute,
}

/// `[analysis]` section: timings and evaluator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Delay between upload progress ticks
    pub upload_tick_ms: u64,
    /// Upload progress added per tick (percent)
    pub upload_step_percent: f64,
    /// Simulated processing time of one evaluator pass
    pub evaluator_delay_ms: u64,
    /// A pass running longer than this counts as failed
    pub evaluator_timeout_ms: u64,
    /// Input gate size ceiling
    pub max_upload_bytes: u64,
    pub failure_policy: FailurePolicy,
    /// Probability that the simulated evaluator answers "fake"
    pub fake_probability: f64,
    pub confidence_min: f64,
    pub confidence_max: f64,
    /// Evaluator names, in evaluation order
    pub evaluators: Vec<String>,
    /// Fixed RNG seed for reproducible simulated verdicts
    pub seed: Option<u64>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            upload_tick_ms: 200,
            upload_step_percent: 10.0,
            evaluator_delay_ms: 1000,
            evaluator_timeout_ms: 10_000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            failure_policy: FailurePolicy::Abort,
            fake_probability: 0.3,
            confidence_min: 60.0,
            confidence_max: 100.0,
            evaluators: DEFAULT_EVALUATORS.iter().map(|s| s.to_string()).collect(),
            seed: None,
        }
    }
}

impl AnalysisSettings {
    /// Reject settings the workflow cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.evaluators.is_empty() {
            return Err(Error::Config("analysis.evaluators must not be empty".to_string()));
        }
        if !(self.upload_step_percent > 0.0 && self.upload_step_percent <= 100.0) {
            return Err(Error::Config(format!(
                "analysis.upload_step_percent must be in (0, 100], got {}",
                self.upload_step_percent
            )));
        }
        if !(0.0..=1.0).contains(&self.fake_probability) {
            return Err(Error::Config(format!(
                "analysis.fake_probability must be in [0, 1], got {}",
                self.fake_probability
            )));
        }
        if !(0.0 <= self.confidence_min
            && self.confidence_min < self.confidence_max
            && self.confidence_max <= 100.0)
        {
            return Err(Error::Config(format!(
                "analysis confidence range invalid: [{}, {})",
                self.confidence_min, self.confidence_max
            )));
        }
        if self.evaluator_timeout_ms == 0 {
            return Err(Error::Config("analysis.evaluator_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for reports and working files
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub analysis: AnalysisSettings,
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
    config.analysis.validate()?;
    Ok(config)
}

/// Load a TOML config file, falling back to defaults when it is missing
///
/// A file that exists but does not parse is still an error: silently
/// ignoring a broken config would hide operator mistakes.
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(path) if path.exists() => {
            let config = load_toml_config(path)?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!("Config file not found: {} - using defaults", path.display());
            Ok(TomlConfig::default())
        }
        None => {
            warn!("Could not determine config directory - using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Root folder resolution (environment → TOML → compiled default)
pub struct RootFolderResolver {
    module_name: String,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
        }
    }

    /// Resolve the root folder. Never fails.
    pub fn resolve(&self) -> PathBuf {
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            return PathBuf::from(path);
        }
        if let Ok(path) = std::env::var(ROOT_ENV) {
            return PathBuf::from(path);
        }

        if let Some(config_path) = config_file_path(&self.module_name) {
            if config_path.exists() {
                match load_toml_config(&config_path) {
                    Ok(TomlConfig {
                        root_folder: Some(root),
                        ..
                    }) => return root,
                    Ok(_) => {}
                    Err(e) => warn!("Ignoring unreadable config for root folder: {}", e),
                }
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout on startup
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Folder that exported analysis reports are written to
    pub fn reports_path(&self) -> PathBuf {
        self.root_folder.join("reports")
    }

    /// Create the root and reports folders if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.reports_path())?;
        Ok(())
    }
}
