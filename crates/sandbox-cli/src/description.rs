//! The TOML shape `sandbox-cli manifest build` reads: a controller's manifest,
//! written by hand instead of being produced by the real build engine.
//! Mirrors section 6's payload sequence field for field, but with policy
//! flags spelled as lowercase-snake-case names instead of a bitmask so a
//! human can write one of these without consulting `sandbox_core::PolicyFlags`'
//! bit positions.

use anyhow::{bail, Result};
use serde::Deserialize;

use manifest_decoder::encode::ManifestBuilder;
use sandbox_core::PolicyFlags;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ManifestDescription {
    #[serde(default)]
    pub debug_flag: bool,
    #[serde(default = "default_injection_timeout_minutes")]
    pub injection_timeout_minutes: u32,
    #[serde(default)]
    pub pip_id: u64,
    #[serde(default)]
    pub internal_error_path: String,
    #[serde(default)]
    pub global_flags: Vec<String>,
    #[serde(default)]
    pub extra_flags: u32,
    #[serde(default)]
    pub report_path: Option<String>,
    #[serde(default)]
    pub dll32: String,
    #[serde(default)]
    pub dll64: String,
    #[serde(default)]
    pub breakaway: Vec<BreakawayDescription>,
    #[serde(default)]
    pub translate: Vec<TranslateDescription>,
    #[serde(default)]
    pub shim: Option<ShimDescription>,
    #[serde(default)]
    pub paths: Vec<PathPolicyDescription>,
}

fn default_injection_timeout_minutes() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakawayDescription {
    pub image_name: String,
    #[serde(default)]
    pub args_substring: Option<String>,
    #[serde(default)]
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateDescription {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShimMatchDescription {
    pub image_name: String,
    #[serde(default)]
    pub args_substring: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShimDescription {
    pub shim_path: String,
    #[serde(default)]
    pub shim_all_processes: bool,
    #[serde(default)]
    pub plugin_path_32: Option<String>,
    #[serde(default)]
    pub plugin_path_64: Option<String>,
    #[serde(default)]
    pub matches: Vec<ShimMatchDescription>,
}

/// One path's policy record. `path` is split on `\` into atoms the same
/// way the real controller's tree builder would; `flags`/`cone_flags` name
/// the bits from section 3's "Policy Flags" table. `cone_flags` defaults
/// to `flags` when absent, matching the common case of a subtree that
/// should inherit its root's own policy.
#[derive(Debug, Clone, Deserialize)]
pub struct PathPolicyDescription {
    pub path: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub cone_flags: Option<Vec<String>>,
    #[serde(default)]
    pub usn: Option<u64>,
}

pub fn parse_policy_flag(name: &str) -> Result<PolicyFlags> {
    Ok(match name {
        "allow_read" => PolicyFlags::ALLOW_READ,
        "allow_read_if_nonexistent" => PolicyFlags::ALLOW_READ_IF_NONEXISTENT,
        "allow_write" => PolicyFlags::ALLOW_WRITE,
        "allow_symlink_creation" => PolicyFlags::ALLOW_SYMLINK_CREATION,
        "allow_create_directory" => PolicyFlags::ALLOW_CREATE_DIRECTORY,
        "report_access" => PolicyFlags::REPORT_ACCESS,
        "report_access_if_existent" => PolicyFlags::REPORT_ACCESS_IF_EXISTENT,
        "report_access_if_nonexistent" => PolicyFlags::REPORT_ACCESS_IF_NONEXISTENT,
        "report_directory_enumeration" => PolicyFlags::REPORT_DIRECTORY_ENUMERATION,
        "override_timestamps" => PolicyFlags::OVERRIDE_TIMESTAMPS,
        "enable_full_reparse_point_parsing" => PolicyFlags::ENABLE_FULL_REPARSE_POINT_PARSING,
        "treat_directory_symlink_as_directory" => {
            PolicyFlags::TREAT_DIRECTORY_SYMLINK_AS_DIRECTORY
        }
        "indicate_untracked" => PolicyFlags::INDICATE_UNTRACKED,
        other => bail!("unknown policy flag {other:?}"),
    })
}

pub fn parse_policy_flags(names: &[String]) -> Result<PolicyFlags> {
    let mut flags = PolicyFlags::empty();
    for name in names {
        flags |= parse_policy_flag(name)?;
    }
    Ok(flags)
}

pub fn parse_global_flag(name: &str) -> Result<u32> {
    Ok(match name {
        "fail_unexpected_file_accesses" => 1 << 0,
        "monitor_child_processes" => 1 << 1,
        "explicitly_report_directory_probes" => 1 << 2,
        "report_all_accesses" => 1 << 3,
        "ignore_reparse_points" => 1 << 4,
        "downgrade_write_to_read" => 1 << 5,
        "disable_detours" => 1 << 6,
        other => bail!("unknown global flag {other:?}"),
    })
}

/// Splits a Windows path into the atoms `ManifestBuilder::add_path` wants,
/// the same way the policy tree itself splits a canonical path's tail.
fn atoms(path: &str) -> Vec<&str> {
    path.split('\\').filter(|s| !s.is_empty()).collect()
}

/// Turns a parsed description into the binary manifest payload.
pub fn build(description: &ManifestDescription) -> Result<Vec<u8>> {
    let mut builder = ManifestBuilder::new();
    builder
        .set_debug_flag(description.debug_flag)
        .set_injection_timeout_minutes(description.injection_timeout_minutes)
        .set_pip_id(description.pip_id)
        .set_internal_error_path(description.internal_error_path.clone())
        .set_extra_flags(description.extra_flags)
        .set_dll_block(description.dll32.clone(), description.dll64.clone());

    let mut global_flags = 0u32;
    for name in &description.global_flags {
        global_flags |= parse_global_flag(name)?;
    }
    builder.set_flags(global_flags);

    if let Some(path) = &description.report_path {
        builder.set_report_path(path.clone());
    }

    for b in &description.breakaway {
        builder.add_breakaway(
            b.image_name.clone(),
            b.args_substring.clone(),
            b.case_insensitive,
        );
    }

    for t in &description.translate {
        builder.add_translation(t.from.clone(), t.to.clone());
    }

    if let Some(shim) = &description.shim {
        builder.set_shim(
            shim.shim_path.clone(),
            shim.shim_all_processes,
            shim.plugin_path_32.clone(),
            shim.plugin_path_64.clone(),
        );
        for m in &shim.matches {
            builder.add_shim_match(m.image_name.clone(), m.args_substring.clone());
        }
    }

    for p in &description.paths {
        let node_policy = parse_policy_flags(&p.flags)?;
        let cone_policy = match &p.cone_flags {
            Some(names) => parse_policy_flags(names)?,
            None => node_policy,
        };
        builder.add_path(&atoms(&p.path), node_policy, cone_policy, p.usn);
    }

    Ok(builder.encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_minimal_manifest_from_toml() {
        let toml_src = r#"
            pip_id = 7
            internal_error_path = "C:\\err.log"

            [[paths]]
            path = "C:\\src"
            flags = ["allow_read", "report_access_if_existent"]
        "#;
        let description: ManifestDescription = toml::from_str(toml_src).unwrap();
        let bytes = build(&description).unwrap();
        let state = manifest_decoder::decode_manifest(&bytes).unwrap();
        assert_eq!(state.pip_id, sandbox_core::PipId(7));
    }

    #[test]
    fn unknown_flag_name_is_rejected() {
        let err = parse_policy_flag("not_a_real_flag").unwrap_err();
        assert!(err.to_string().contains("not_a_real_flag"));
    }

    #[test]
    fn cone_flags_default_to_node_flags() {
        let toml_src = r#"
            [[paths]]
            path = "C:\\out"
            flags = ["allow_write"]
        "#;
        let description: ManifestDescription = toml::from_str(toml_src).unwrap();
        let bytes = build(&description).unwrap();
        let state = manifest_decoder::decode_manifest(&bytes).unwrap();
        let root = state.tree.root_cursor();
        let cursor = policy_engine::PolicyTree::find(&root, &["C:".encode_utf16().collect(), "out".encode_utf16().collect()]);
        assert!(cursor.policy().contains(PolicyFlags::ALLOW_WRITE));
    }
}
