//! Configuration resolution for dfd-an
//!
//! Priority: command line (with env fallbacks applied by clap) → TOML file →
//! root folder resolver (environment, default TOML) → compiled defaults.

use dfd_common::config::{
    config_file_path, load_or_default, AnalysisSettings, CompiledDefaults, LoggingConfig, RootFolderResolver,
    TomlConfig,
};
use dfd_common::Result;
use std::path::PathBuf;
use tracing::info;

/// Module name used for the config file (`dfd-an.toml`)
pub const MODULE_NAME: &str = "dfd-an";

/// Values given on the command line (or their env fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub root_folder: Option<PathBuf>,
    pub log_level: Option<String>,
    pub config: Option<PathBuf>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub root_folder: PathBuf,
    pub logging: LoggingConfig,
    pub analysis: AnalysisSettings,
    /// TOML file that was consulted, if any
    pub config_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Load the TOML file and merge it with the overrides
    ///
    /// A missing file degrades to defaults; a malformed one is an error.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let config_path = cli.config.clone().or_else(|| config_file_path(MODULE_NAME));
        let toml = load_or_default(config_path.as_deref())?;
        let config = Self::from_parts(cli, toml, config_path);

        info!(
            port = config.port,
            root_folder = %config.root_folder.display(),
            evaluators = config.analysis.evaluators.len(),
            failure_policy = ?config.analysis.failure_policy,
            "Configuration resolved"
        );
        Ok(config)
    }

    /// Merge overrides over an already-loaded TOML config
    pub fn from_parts(cli: &CliOverrides, toml: TomlConfig, config_path: Option<PathBuf>) -> Self {
        let port = cli
            .port
            .or(toml.port)
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().port);
        let root_folder = cli
            .root_folder
            .clone()
            .or(toml.root_folder)
            .unwrap_or_else(|| RootFolderResolver::new(MODULE_NAME).resolve());

        let mut logging = toml.logging;
        if let Some(level) = &cli.log_level {
            logging.level = level.clone();
        }

        Self {
            port,
            root_folder,
            logging,
            analysis: toml.analysis,
            config_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfd_common::config::FailurePolicy;

    #[test]
    fn test_cli_overrides_toml() {
        let toml = TomlConfig {
            root_folder: Some(PathBuf::from("/srv/dfd")),
            port: Some(6000),
            ..Default::default()
        };
        let cli = CliOverrides {
            port: Some(7000),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        let config = ServiceConfig::from_parts(&cli, toml, None);
        assert_eq!(config.port, 7000);
        assert_eq!(config.root_folder, PathBuf::from("/srv/dfd"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_toml_used_when_no_override() {
        let mut toml = TomlConfig {
            port: Some(6001),
            root_folder: Some(PathBuf::from("/data/dfd")),
            ..Default::default()
        };
        toml.analysis.failure_policy = FailurePolicy::Substitute;

        let config = ServiceConfig::from_parts(&CliOverrides::default(), toml, None);
        assert_eq!(config.port, 6001);
        assert_eq!(config.analysis.failure_policy, FailurePolicy::Substitute);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_resolve_reads_given_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dfd-an.toml");
        std::fs::write(
            &path,
            r#"
port = 6123
root_folder = "/tmp/dfd-test"

[analysis]
evaluator_delay_ms = 5
evaluators = ["One", "Two"]
"#,
        )
        .unwrap();

        let cli = CliOverrides {
            config: Some(path.clone()),
            ..Default::default()
        };
        let config = ServiceConfig::resolve(&cli).unwrap();
        assert_eq!(config.port, 6123);
        assert_eq!(config.analysis.evaluator_delay_ms, 5);
        assert_eq!(config.analysis.evaluators, vec!["One", "Two"]);
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_resolve_rejects_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[analysis]\nevaluators = []\n").unwrap();

        let cli = CliOverrides {
            config: Some(path),
            ..Default::default()
        };
        assert!(ServiceConfig::resolve(&cli).is_err());
    }
}
