//! Substitute-process shim (C10): decide whether a child-process launch
//! should be replaced with a configured shim binary, optionally consulting
//! a plugin DLL that can rewrite arguments and veto or force the decision.

pub mod decision;
pub mod plugin;

use libloading::Library;
use manifest_decoder::ShimConfig;
use thiserror::Error;

pub use decision::ShimDecision;
use plugin::PluginError;

#[derive(Debug, Error)]
pub enum ShimError {
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Resolves the shim decision for one child-process launch.
///
/// `is_64_bit_host` selects which of the manifest's two plugin paths to
/// load, mirroring the source's compile-time `_WIN64` branch. Section 9
/// leaves the cross-bitness case (a 32-bit host shimming into a 64-bit
/// child, or vice versa) unresolved upstream; this always loads the
/// plugin matching the *launching* process's own bitness.
pub fn resolve_shim_decision(
    config: &ShimConfig,
    image: &str,
    args: &str,
    env_block: &[u16],
    cwd: &str,
    is_64_bit_host: bool,
) -> Result<ShimDecision, ShimError> {
    let plugin_path = if is_64_bit_host {
        config.plugin_path_64.as_ref()
    } else {
        config.plugin_path_32.as_ref()
    };

    let (should_shim, effective_args) = match plugin_path {
        Some(path) => {
            let lib = unsafe { Library::new(path) }.map_err(PluginError::from)?;
            let matches_fn = plugin::resolve_command_matches(&lib)?;
            let (vote, modified) = unsafe {
                plugin::call_command_matches(matches_fn, image, args, env_block, cwd)?
            };
            let rewritten = modified.map(|m| m.to_wide_string().to_string_lossy());
            let should_shim = decision::fold_plugin_vote(config.shim_all_processes, vote);
            (should_shim, rewritten.unwrap_or_else(|| args.to_string()))
        }
        None => (decision::static_match(config, image, args), args.to_string()),
    };

    if !should_shim {
        return Ok(ShimDecision::PassThrough);
    }

    Ok(ShimDecision::Shim {
        shim_path: config.shim_path.clone(),
        command_line: decision::rebuild_command_line(image, &effective_args),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn no_plugin_and_empty_match_list_follows_shim_all() {
        let config = ShimConfig {
            shim_all_processes: true,
            shim_path: PathBuf::from(r"C:\tools\shim.exe"),
            plugin_path_32: None,
            plugin_path_64: None,
            matches: vec![],
        };
        let decision =
            resolve_shim_decision(&config, r"C:\x\cl.exe", "/c foo.c", &[0], "C:\\x", true)
                .unwrap();
        match decision {
            ShimDecision::Shim { command_line, .. } => {
                assert_eq!(command_line, "\"C:\\x\\cl.exe\" /c foo.c");
            }
            ShimDecision::PassThrough => panic!("expected a shim decision"),
        }
    }

    #[test]
    fn no_plugin_and_shim_all_off_passes_through() {
        let config = ShimConfig {
            shim_all_processes: false,
            shim_path: PathBuf::from(r"C:\tools\shim.exe"),
            plugin_path_32: None,
            plugin_path_64: None,
            matches: vec![],
        };
        let decision =
            resolve_shim_decision(&config, r"C:\x\cl.exe", "/c foo.c", &[0], "C:\\x", true)
                .unwrap();
        assert_eq!(decision, ShimDecision::PassThrough);
    }
}
