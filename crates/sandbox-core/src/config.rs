use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::SandboxError;

/// On-disk configuration for the dev/test harness (`sandbox-cli`) and for
/// constructing a manifest by hand instead of receiving one from a real
/// controller process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Path the report channel appends framed records to when run outside
    /// of a real injected session (the CLI's replay/dry-run modes).
    pub sink_path: PathBuf,
    pub failure_threshold: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sink_path: PathBuf::from("sandbox-report.bin"),
            failure_threshold: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    pub pip_id: u64,
    pub internal_error_path: PathBuf,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            pip_id: 0,
            internal_error_path: PathBuf::from("sandbox-internal-error.log"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report: ReportConfig::default(),
            manifest: ManifestConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, SandboxError> {
        toml::from_str(s).map_err(|e| SandboxError::InvalidConfig(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, SandboxError> {
        toml::to_string_pretty(self).map_err(|e| SandboxError::InvalidConfig(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, SandboxError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn save(&self, path: &Path) -> Result<(), SandboxError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

/// Resolves the standard config/data directories for `sandbox-cli`, the
/// same way the rest of the corpus resolves per-user application
/// directories.
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl ConfigPaths {
    pub fn resolve() -> Option<Self> {
        let dirs = ProjectDirs::from("io", "sandbox-interceptor", "sandbox-cli")?;
        Some(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config::default();
        let s = cfg.to_toml_string().unwrap();
        let back = Config::from_toml_str(&s).unwrap();
        assert_eq!(back.report.failure_threshold, cfg.report.failure_threshold);
    }
}
