//! TOML configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use driftwise::optimize::BACKEND_PRIORITY;
use driftwise::{SolverConfig, UnmodeledPolicy};
use log::warn;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Longest solve a config may ask for.
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub solver: SolverSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverSection {
    #[serde(default)]
    pub preferred_backend: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub unmodeled: UnmodeledPolicy,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            preferred_backend: None,
            timeout_secs: default_timeout(),
            unmodeled: UnmodeledPolicy::default(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.solver.timeout_secs == 0 || self.solver.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "timeout_secs must be in [1, {MAX_TIMEOUT_SECS}]"
            )));
        }
        if let Some(name) = &self.solver.preferred_backend {
            if name.trim().is_empty() {
                return Err(Error::Config("preferred_backend must not be empty".into()));
            }
            if !BACKEND_PRIORITY.contains(&name.as_str()) {
                warn!("Unknown solver backend '{name}', the default will be used");
            }
        }
        if self.logging.audit_file.is_empty() {
            return Err(Error::Config("audit_file must not be empty".into()));
        }
        Ok(())
    }

    /// Engine configuration for this run.
    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            preferred_backend: self.solver.preferred_backend.clone(),
            unmodeled: self.solver.unmodeled,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.solver.timeout_secs)
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[solver]
preferred_backend = "local-search"
timeout_secs = 10
unmodeled = "hold"

[logging]
dir = "./logs"
audit_file = "audit.jsonl"
"#
    }

    #[test]
    fn parse_example_config() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.solver.preferred_backend.as_deref(), Some("local-search"));
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.solver.unmodeled, UnmodeledPolicy::Hold);
        assert_eq!(
            config.solver_config(),
            SolverConfig {
                preferred_backend: Some("local-search".into()),
                unmodeled: UnmodeledPolicy::Hold,
            }
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.solver.timeout_secs, 30);
        assert_eq!(config.solver.unmodeled, UnmodeledPolicy::Liquidate);
        assert!(config.solver.preferred_backend.is_none());
        assert_eq!(config.logging.dir, "./logs");
    }

    #[test]
    fn validate_catches_zero_timeout() {
        let toml = example_toml().replace("timeout_secs = 10", "timeout_secs = 0");
        assert!(matches!(Config::from_toml(&toml), Err(Error::Config(_))));
    }

    #[test]
    fn validate_catches_blank_backend() {
        let toml = example_toml().replace("\"local-search\"", "\"  \"");
        assert!(matches!(Config::from_toml(&toml), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_policy_is_parse_error() {
        let toml = example_toml().replace("\"hold\"", "\"ignore\"");
        assert!(matches!(Config::from_toml(&toml), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn audit_path() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(
            config.audit_path(),
            std::path::PathBuf::from("./logs/audit.jsonl")
        );
    }
}
