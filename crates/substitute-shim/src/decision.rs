//! Whether a child-process launch should be redirected to the shim binary,
//! and with which rebuilt command line, per section 4.10.

use std::path::{Path, PathBuf};

use manifest_decoder::{ShimConfig, ShimMatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShimDecision {
    Shim {
        shim_path: PathBuf,
        command_line: String,
    },
    PassThrough,
}

fn image_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| path.to_ascii_lowercase())
}

fn matches_entry(entry: &ShimMatch, image: &str, command_line: &str) -> bool {
    if image_name(image) != image_name(&entry.image_name) {
        return false;
    }
    match &entry.args_substring {
        Some(substr) => command_line.contains(substr.as_str()),
        None => true,
    }
}

/// The match-list/`shim-all` verdict, before any plugin is consulted: if
/// the match list is empty, `shim-all` alone governs; otherwise the launch
/// must match some entry's image name and (if present) args substring.
pub fn static_match(config: &ShimConfig, image: &str, command_line: &str) -> bool {
    if config.matches.is_empty() {
        config.shim_all_processes
    } else {
        config
            .matches
            .iter()
            .any(|m| matches_entry(m, image, command_line))
    }
}

/// Combines a plugin's vote with `shim-all`: when all-processes mode is
/// off, a `true` vote means *do* shim; when it is on, a `true` vote means
/// *skip* shimming. A present plugin's vote is authoritative over the
/// match-list verdict.
pub fn fold_plugin_vote(shim_all_processes: bool, plugin_vote: bool) -> bool {
    plugin_vote ^ shim_all_processes
}

/// Builds the replacement command line `"<image>" <args>`.
pub fn rebuild_command_line(image: &str, args: &str) -> String {
    if args.is_empty() {
        format!("\"{image}\"")
    } else {
        format!("\"{image}\" {args}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(shim_all: bool, matches: Vec<ShimMatch>) -> ShimConfig {
        ShimConfig {
            shim_all_processes: shim_all,
            shim_path: PathBuf::from(r"C:\tools\shim.exe"),
            plugin_path_32: None,
            plugin_path_64: None,
            matches,
        }
    }

    #[test]
    fn empty_match_list_defers_entirely_to_shim_all() {
        assert!(static_match(&config(true, vec![]), r"C:\x\cl.exe", ""));
        assert!(!static_match(&config(false, vec![]), r"C:\x\cl.exe", ""));
    }

    #[test]
    fn match_list_matches_on_image_name_case_insensitively() {
        let cfg = config(
            false,
            vec![ShimMatch {
                image_name: "CL.EXE".into(),
                args_substring: None,
            }],
        );
        assert!(static_match(&cfg, r"C:\tools\cl.exe", "/c foo.c"));
        assert!(!static_match(&cfg, r"C:\tools\link.exe", "/c foo.c"));
    }

    #[test]
    fn match_list_entry_with_args_substring_requires_it_present() {
        let cfg = config(
            false,
            vec![ShimMatch {
                image_name: "cl.exe".into(),
                args_substring: Some("/showIncludes".into()),
            }],
        );
        assert!(static_match(&cfg, r"C:\tools\cl.exe", "/c /showIncludes foo.c"));
        assert!(!static_match(&cfg, r"C:\tools\cl.exe", "/c foo.c"));
    }

    #[test]
    fn plugin_vote_xor_shim_all_do_shim_when_off() {
        assert!(fold_plugin_vote(false, true));
        assert!(!fold_plugin_vote(false, false));
    }

    #[test]
    fn plugin_vote_xor_shim_all_skip_shim_when_on() {
        assert!(!fold_plugin_vote(true, true));
        assert!(fold_plugin_vote(true, false));
    }

    #[test]
    fn rebuild_command_line_quotes_the_image_and_keeps_args() {
        assert_eq!(
            rebuild_command_line(r"C:\tools\shim.exe", "/c foo.c"),
            "\"C:\\tools\\shim.exe\" /c foo.c"
        );
        assert_eq!(
            rebuild_command_line(r"C:\tools\shim.exe", ""),
            "\"C:\\tools\\shim.exe\""
        );
    }
}
