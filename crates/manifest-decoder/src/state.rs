use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use policy_engine::{PolicyTree, TranslationTable};
use sandbox_core::PipId;

bitflags! {
    /// Process-wide flag word (`ManifestFlags`), consulted by components
    /// that have no single policy cursor to ask — the access-check engine's
    /// `AccessCheckFlags` and the detours' reparse/downgrade behavior are
    /// both derived from this.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GlobalFlags: u32 {
        const FAIL_UNEXPECTED_FILE_ACCESSES      = 1 << 0;
        const MONITOR_CHILD_PROCESSES            = 1 << 1;
        const EXPLICITLY_REPORT_DIRECTORY_PROBES = 1 << 2;
        const REPORT_ALL_ACCESSES                = 1 << 3;
        const IGNORE_REPARSE_POINTS              = 1 << 4;
        /// `downgrade-to-read`: a denied write that also has read
        /// permission is rewritten to a read-only open instead of denied
        /// outright (section 4.9).
        const DOWNGRADE_WRITE_TO_READ             = 1 << 5;
        const DISABLE_DETOURS                    = 1 << 6;
    }
}

/// A `{process-name, args-substring, flags-byte}` entry from
/// `ManifestChildProcessesToBreakAwayFromJob`.
#[derive(Debug, Clone)]
pub struct BreakawayDescriptor {
    pub image_name: String,
    pub args_substring: Option<String>,
    pub case_insensitive: bool,
}

impl BreakawayDescriptor {
    /// Whether `image` (and, if present, `command_line`) matches this
    /// descriptor, per the breakaway rule in section 4.9: image name and
    /// optional args substring.
    pub fn matches(&self, image: &str, command_line: &str) -> bool {
        let image_matches = if self.case_insensitive {
            image.eq_ignore_ascii_case(&self.image_name)
        } else {
            image == self.image_name
        };
        if !image_matches {
            return false;
        }
        match &self.args_substring {
            None => true,
            Some(substr) if substr.is_empty() => true,
            Some(substr) => {
                if self.case_insensitive {
                    command_line
                        .to_ascii_lowercase()
                        .contains(&substr.to_ascii_lowercase())
                } else {
                    command_line.contains(substr.as_str())
                }
            }
        }
    }
}

/// A `{name, args}` entry from the shim's process-match list.
#[derive(Debug, Clone)]
pub struct ShimMatch {
    pub image_name: String,
    pub args_substring: Option<String>,
}

/// `ManifestSubstituteProcessExecutionShim`.
#[derive(Debug, Clone)]
pub struct ShimConfig {
    pub shim_all_processes: bool,
    pub shim_path: PathBuf,
    pub plugin_path_32: Option<PathBuf>,
    pub plugin_path_64: Option<PathBuf>,
    pub matches: Vec<ShimMatch>,
}

/// `ManifestDllBlock`: both interceptor DLL variants, so a 32-bit build
/// engine can inject into a 64-bit child and vice versa.
#[derive(Debug, Clone)]
pub struct DllBlock {
    pub dll32: PathBuf,
    pub dll64: PathBuf,
}

/// `ManifestReport`: either a handle the host pre-opened and passed down,
/// or a path the attach routine should open itself.
#[derive(Debug, Clone)]
pub enum ReportDescriptor {
    None,
    Handle(u64),
    Path(PathBuf),
}

/// The fully decoded, process-wide manifest state (section 3's "Global
/// Manifest State"). Constructed once at DLL attach and immutable
/// thereafter; published to the rest of the process via a release barrier
/// (`sandbox-dll::bootstrap` wraps this in a `once_cell::sync::OnceCell`).
#[derive(Debug, Clone)]
pub struct GlobalManifestState {
    pub debug_flag: bool,
    pub injection_timeout: Duration,
    pub breakaway: Vec<BreakawayDescriptor>,
    pub translations: TranslationTable,
    pub internal_error_path: PathBuf,
    pub flags: GlobalFlags,
    pub extra_flags: u32,
    pub pip_id: PipId,
    pub report: ReportDescriptor,
    pub dll_block: DllBlock,
    pub shim: Option<ShimConfig>,
    pub tree: Arc<PolicyTree>,
}
