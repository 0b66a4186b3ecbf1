//! The access-check engine (C4): turns a policy cursor plus a requested
//! operation into an [`AccessCheckResult`].

use sandbox_core::{Action, AccessCheckResult, Existence, FileReadContext, PathValidity, PolicyFlags, ReportLevel};

use crate::tree::PolicyCursor;

/// The kind of read-style access being checked. `Lookup` covers a bare
/// existence probe that does not itself constitute a dependency (e.g. the
/// prefix walk inside reparse resolution before the final hop).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAccessKind {
    Read,
    Probe,
    Enumerate,
    EnumerationProbe,
    Lookup,
}

/// Process-wide flags that the access-check algebra consults but that do
/// not live on any single policy cursor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessCheckFlags {
    /// `FailUnexpectedFileAccesses` — denials become `Deny` instead of
    /// `Warn` when set.
    pub fail_unexpected_file_accesses: bool,
    /// `ExplicitlyReportDirectoryProbes` — directory probes escalate to
    /// `ReportExplicit` the same way file probes do when set.
    pub explicitly_report_directory_probes: bool,
    /// A process-wide "report every access" flag, independent of the
    /// per-path `ReportAccess*` bits.
    pub report_any_access: bool,
}

const READ_MASK: u32 = 0x01;
const WRITE_MASK: u32 = 0x02;
const CREATE_DIRECTORY_MASK: u32 = 0x04;
const SYMLINK_CREATION_MASK: u32 = 0x08;

/// `check-read` from section 4.4.
pub fn check_read(
    cursor: &PolicyCursor,
    read_ctx: FileReadContext,
    kind: ReadAccessKind,
    flags: AccessCheckFlags,
) -> AccessCheckResult {
    if read_ctx.existence == Existence::InvalidPath {
        return AccessCheckResult {
            access_mask: READ_MASK,
            action: Action::Allow,
            report_level: ReportLevel::Ignore,
            validity: PathValidity::Invalid,
        };
    }

    // Directory opens are always allowed: there is no way to declare a
    // read dependency on "the directory as such".
    if read_ctx.opened_directory {
        return directory_open_result(read_ctx, flags);
    }

    let policy = cursor.policy();
    let existent = read_ctx.existence == Existence::Existent;
    let allowed = (existent && policy.contains(PolicyFlags::ALLOW_READ))
        || (!existent && policy.contains(PolicyFlags::ALLOW_READ_IF_NONEXISTENT))
        || kind == ReadAccessKind::EnumerationProbe;

    let action = if allowed {
        Action::Allow
    } else if kind == ReadAccessKind::EnumerationProbe {
        // EnumerationProbe never escalates to Deny — back-compat clause.
        Action::Warn
    } else if flags.fail_unexpected_file_accesses {
        Action::Deny
    } else {
        Action::Warn
    };

    let directory_like = read_ctx.opened_directory;
    let wants_explicit = (flags.explicitly_report_directory_probes || !directory_like)
        && ((existent && policy.contains(PolicyFlags::REPORT_ACCESS_IF_EXISTENT))
            || (!existent && policy.contains(PolicyFlags::REPORT_ACCESS_IF_NONEXISTENT)));

    let report_level = if wants_explicit {
        ReportLevel::ReportExplicit
    } else if flags.report_any_access || policy.contains(PolicyFlags::REPORT_ACCESS) {
        ReportLevel::Report
    } else {
        ReportLevel::Ignore
    };

    AccessCheckResult {
        access_mask: READ_MASK,
        action,
        report_level,
        validity: PathValidity::Valid,
    }
}

fn directory_open_result(read_ctx: FileReadContext, flags: AccessCheckFlags) -> AccessCheckResult {
    AccessCheckResult {
        access_mask: READ_MASK,
        action: Action::Allow,
        report_level: if flags.report_any_access {
            ReportLevel::Report
        } else {
            ReportLevel::Ignore
        },
        validity: if read_ctx.existence == Existence::InvalidPath {
            PathValidity::Invalid
        } else {
            PathValidity::Valid
        },
    }
}

/// A lazily-run probe of the real filesystem, used only on write denial to
/// classify the path as `Valid` / `PathComponentNotFound` / `Invalid`
/// without paying the syscall cost on the (common) allowed path.
pub trait PathProbe {
    fn probe(&mut self) -> PathValidity;
}

impl<F: FnMut() -> PathValidity> PathProbe for F {
    fn probe(&mut self) -> PathValidity {
        self()
    }
}

fn gated_write_check(
    allowed: bool,
    mask: u32,
    mut probe: impl PathProbe,
    flags: AccessCheckFlags,
) -> Option<AccessCheckResult> {
    if allowed {
        return Some(AccessCheckResult {
            access_mask: mask,
            action: Action::Allow,
            report_level: if flags.report_any_access {
                ReportLevel::Report
            } else {
                ReportLevel::Ignore
            },
            validity: PathValidity::Valid,
        });
    }

    let validity = probe.probe();
    if validity == PathValidity::Invalid {
        // The path could never have been written anyway; let the real
        // error stand without telling the controller about it.
        return None;
    }

    let action = if flags.fail_unexpected_file_accesses {
        Action::Deny
    } else {
        Action::Warn
    };

    Some(AccessCheckResult {
        access_mask: mask,
        action,
        report_level: ReportLevel::ReportExplicit,
        validity,
    })
}

/// `check-write` from section 4.4.
pub fn check_write(
    cursor: &PolicyCursor,
    probe: impl PathProbe,
    flags: AccessCheckFlags,
) -> Option<AccessCheckResult> {
    gated_write_check(
        cursor.policy().contains(PolicyFlags::ALLOW_WRITE),
        WRITE_MASK,
        probe,
        flags,
    )
}

/// `check-create-directory`: gated on `AllowCreateDirectory`, same shape as
/// `check-write`.
pub fn check_create_directory(
    cursor: &PolicyCursor,
    probe: impl PathProbe,
    flags: AccessCheckFlags,
) -> Option<AccessCheckResult> {
    gated_write_check(
        cursor.policy().contains(PolicyFlags::ALLOW_CREATE_DIRECTORY),
        CREATE_DIRECTORY_MASK,
        probe,
        flags,
    )
}

/// `check-symlink-creation`: gated on `AllowSymlinkCreation`.
pub fn check_symlink_creation(
    cursor: &PolicyCursor,
    probe: impl PathProbe,
    flags: AccessCheckFlags,
) -> Option<AccessCheckResult> {
    gated_write_check(
        cursor.policy().contains(PolicyFlags::ALLOW_SYMLINK_CREATION),
        SYMLINK_CREATION_MASK,
        probe,
        flags,
    )
}

/// Win32 error code a denied [`AccessCheckResult`] should be synthesized
/// as, per section 4.4's denial error mapping.
pub fn win32_error_for(validity: PathValidity) -> u32 {
    const ERROR_ACCESS_DENIED: u32 = 5;
    const ERROR_PATH_NOT_FOUND: u32 = 3;
    const ERROR_INVALID_NAME: u32 = 123;
    match validity {
        PathValidity::Valid => ERROR_ACCESS_DENIED,
        PathValidity::PathComponentNotFound => ERROR_PATH_NOT_FOUND,
        PathValidity::Invalid => ERROR_INVALID_NAME,
    }
}

/// NTSTATUS equivalent of [`win32_error_for`], for the Nt/Zw detour family.
pub fn ntstatus_for(validity: PathValidity) -> i32 {
    const STATUS_ACCESS_DENIED: i32 = 0xC0000022u32 as i32;
    const STATUS_OBJECT_PATH_NOT_FOUND: i32 = 0xC000003Au32 as i32;
    const STATUS_OBJECT_NAME_INVALID: i32 = 0xC0000033u32 as i32;
    match validity {
        PathValidity::Valid => STATUS_ACCESS_DENIED,
        PathValidity::PathComponentNotFound => STATUS_OBJECT_PATH_NOT_FOUND,
        PathValidity::Invalid => STATUS_OBJECT_NAME_INVALID,
    }
}
