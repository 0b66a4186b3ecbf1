//! `DeleteFile` / `CreateDirectory` (section 4.9, "Delete"):
//! "probe; if target exists and is a file/about-to-be-created directory,
//! write. If the write is denied, retry as a safe probe."

use policy_engine::tree::PolicyCursor;
use policy_engine::{check_create_directory, check_write, AccessCheckFlags, PathProbe};
use sandbox_core::{AccessCheckResult, PathValidity};

/// What the caller should report and whether the real delete/create
/// should proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeThenWriteDecision {
    /// The target does not exist: the real call would have failed anyway,
    /// so only the probe result is reported and nothing is denied here.
    NonexistentProbeOnly(AccessCheckResult),
    /// The write is allowed; proceed with the real delete/create.
    Allowed(AccessCheckResult),
    /// The write is denied; the real call must not happen.
    Denied(AccessCheckResult),
}

fn probe_then_write(
    write_result: Option<AccessCheckResult>,
    target_exists: bool,
) -> ProbeThenWriteDecision {
    match write_result {
        None => {
            // `check_write` returned `None` only when the probe itself
            // found an invalid path; nothing to report either way.
            ProbeThenWriteDecision::Allowed(AccessCheckResult::allow(0))
        }
        Some(result) if result.action == sandbox_core::Action::Allow => {
            ProbeThenWriteDecision::Allowed(result)
        }
        Some(result) => {
            if !target_exists {
                ProbeThenWriteDecision::NonexistentProbeOnly(result)
            } else {
                ProbeThenWriteDecision::Denied(result)
            }
        }
    }
}

/// `DeleteFile`'s decision: treats the target as a write, but a denial on
/// a nonexistent target is downgraded to an informational probe report.
pub fn decide_delete(
    cursor: &PolicyCursor,
    probe: impl PathProbe,
    flags: AccessCheckFlags,
    target_exists: bool,
) -> ProbeThenWriteDecision {
    let result = check_write(cursor, probe, flags);
    probe_then_write(result, target_exists)
}

/// `CreateDirectory`'s decision: same existence-probe-then-write shape,
/// gated on `AllowCreateDirectory` instead of `AllowWrite`.
pub fn decide_create_directory(
    cursor: &PolicyCursor,
    probe: impl PathProbe,
    flags: AccessCheckFlags,
    target_exists: bool,
) -> ProbeThenWriteDecision {
    let result = check_create_directory(cursor, probe, flags);
    probe_then_write(result, target_exists)
}
