//! `CreateProcessW` / `CreateProcessAsUserW` (section 4.9, "Create-Process"):
//! image-path resolution, the breakaway/shim/normal-launch three-way
//! branch, and the `ERROR_INVALID_FUNCTION` retry policy around the real
//! detour-framework launch call.

use std::path::PathBuf;
use std::time::Duration;

use widestring::U16CStr;

use manifest_decoder::{BreakawayDescriptor, ShimConfig};
use policy_engine::tree::PolicyCursor;
use policy_engine::{check_read, AccessCheckFlags, ReadAccessKind};
use sandbox_core::{AccessCheckResult, Existence, FileReadContext};
use substitute_shim::{resolve_shim_decision, ShimDecision, ShimError};

pub const ERROR_INVALID_FUNCTION: u32 = 1;
pub const MAX_CREATE_PROCESS_RETRIES: u32 = 5;
pub const CREATE_PROCESS_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Step 2/3's outcome: what the caller's real-API glue should actually
/// launch, after the breakaway/shim/normal three-way branch in section 4.9
/// has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateProcessLaunchDecision {
    /// Step 1 matched: reissue the real `CreateProcess` with
    /// `CREATE_BREAKAWAY_FROM_JOB` and no handle inheritance; nothing
    /// else here applies.
    Breakaway,
    /// Step 2 matched: launch `shim_path` with `command_line` in place of
    /// the original image.
    Shim { shim_path: PathBuf, command_line: String },
    /// Neither applied: fall through to step 3, the image-path policy
    /// check and `create-detoured-process`.
    Normal,
}

/// Converts a native wide (UTF-16, NUL-terminated) command-line buffer
/// into a Rust string, tolerating a buffer that is not NUL-terminated
/// (some callers hand in a fixed-length slice rather than a C string).
pub fn command_line_from_wide(buf: &[u16]) -> String {
    match U16CStr::from_slice_truncate(buf) {
        Ok(s) => s.to_string_lossy(),
        Err(_) => String::from_utf16_lossy(buf),
    }
}

/// Steps 1-2 of the create-process decision tree: breakaway first, then
/// (if configured) the substitute-process shim, consulting its plugin if
/// one is present. Returns [`CreateProcessLaunchDecision::Normal`] when
/// neither applies, leaving step 3 to the caller.
pub fn decide_launch(
    breakaway: &[BreakawayDescriptor],
    shim: Option<&ShimConfig>,
    image: &str,
    command_line: &str,
    env_block: &[u16],
    cwd: &str,
    is_64_bit_host: bool,
) -> Result<CreateProcessLaunchDecision, ShimError> {
    if matches_breakaway(breakaway, image, command_line) {
        return Ok(CreateProcessLaunchDecision::Breakaway);
    }

    let Some(config) = shim else {
        return Ok(CreateProcessLaunchDecision::Normal);
    };

    match resolve_shim_decision(config, image, command_line, env_block, cwd, is_64_bit_host)? {
        ShimDecision::Shim { shim_path, command_line } => {
            Ok(CreateProcessLaunchDecision::Shim { shim_path, command_line })
        }
        ShimDecision::PassThrough => Ok(CreateProcessLaunchDecision::Normal),
    }
}

/// Resolves the child image path, per section 4.9: the `lpApplicationName`
/// parameter wins when present and non-empty; otherwise the image is
/// parsed out of the command line — a leading quoted token if the command
/// line starts with `"`, or the first whitespace-delimited word otherwise.
pub fn resolve_image_path(application_name: Option<&str>, command_line: &str) -> String {
    if let Some(name) = application_name {
        if !name.is_empty() {
            return name.to_string();
        }
    }

    let trimmed = command_line.trim_start();
    if let Some(rest) = trimmed.strip_prefix('"') {
        return match rest.find('"') {
            Some(end) => rest[..end].to_string(),
            None => rest.to_string(),
        };
    }
    trimmed.split_whitespace().next().unwrap_or("").to_string()
}

/// Step 1 of the create-process decision tree: does the image (and
/// optionally its command line) match a configured breakaway descriptor?
/// A match means the real `CreateProcess` is reissued with
/// `CREATE_BREAKAWAY_FROM_JOB` and no handle inheritance, and nothing else
/// in this module runs.
pub fn matches_breakaway(breakaway: &[BreakawayDescriptor], image: &str, command_line: &str) -> bool {
    breakaway.iter().any(|d| d.matches(image, command_line))
}

/// Step 3's image-path read check, run only once neither breakaway nor the
/// substitute-process shim applied. Any reparse-point resolution on the
/// image path happens in the caller's shared prologue before this runs.
pub fn check_image_access(
    cursor: &PolicyCursor,
    existence: Existence,
    flags: AccessCheckFlags,
) -> AccessCheckResult {
    let ctx = FileReadContext::new(existence, false);
    check_read(cursor, ctx, ReadAccessKind::Read, flags)
}

/// Whether a failed `create-detoured-process` call should be retried, per
/// section 4.9: up to 5 retries with 1-second sleeps, and only when the
/// failure was `ERROR_INVALID_FUNCTION` — any other failure propagates
/// immediately.
pub fn should_retry_create_process(attempt: u32, last_error: u32) -> bool {
    last_error == ERROR_INVALID_FUNCTION && attempt < MAX_CREATE_PROCESS_RETRIES
}
