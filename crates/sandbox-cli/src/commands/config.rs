//! `sandbox-cli config`: the dev-harness' own on-disk configuration (where
//! to sink a replay capture by default, what pip id / internal-error path
//! a hand-built manifest gets when the caller doesn't say) — distinct from
//! the manifest payload a real controller hands the interceptor.

use std::path::PathBuf;

use anyhow::{Context, Result};

use sandbox_core::config::{Config, ConfigPaths};

fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let paths = ConfigPaths::resolve()
        .context("could not resolve a per-user config directory on this platform")?;
    Ok(paths.config_file())
}

pub fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = resolve_path(path)?;
    if config_path.exists() && !force {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create config directory {}", parent.display()))?;
    }
    Config::default().save(&config_path)?;
    println!("config written to {}", config_path.display());
    Ok(())
}

pub fn print_effective(path: Option<PathBuf>) -> Result<()> {
    let config_path = resolve_path(path)?;
    let config = if config_path.exists() {
        Config::load(&config_path)
            .with_context(|| format!("load config {}", config_path.display()))?
    } else {
        Config::default()
    };
    println!("{}", config.to_toml_string()?);
    Ok(())
}
