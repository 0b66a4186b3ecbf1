//! `CreateFile`-family / `NtCreateFile` / `NtOpenFile` / `ZwCreateFile` /
//! `ZwOpenFile` (section 4.9, "Create/Open").

use policy_engine::tree::PolicyCursor;
use policy_engine::{check_read, check_write, AccessCheckFlags, PathProbe, ReadAccessKind};
use sandbox_core::{Action, AccessCheckResult, Existence, FileReadContext, PolicyFlags};

const GENERIC_ALL: u32 = 0x1000_0000;
const GENERIC_WRITE: u32 = 0x4000_0000;
const DELETE: u32 = 0x0001_0000;
const FILE_WRITE_DATA: u32 = 0x0000_0002;
const FILE_APPEND_DATA: u32 = 0x0000_0004;
const FILE_WRITE_EA: u32 = 0x0000_0010;
const FILE_WRITE_ATTRIBUTES: u32 = 0x0000_0100;

const FILE_DELETE_ON_CLOSE: u32 = 0x0000_1000;

pub const CREATE_NEW: u32 = 1;
pub const CREATE_ALWAYS: u32 = 2;
pub const OPEN_EXISTING: u32 = 3;
pub const OPEN_ALWAYS: u32 = 4;
pub const TRUNCATE_EXISTING: u32 = 5;

pub const FILE_SUPERSEDE: u32 = 0;
pub const FILE_OPEN: u32 = 1;
pub const FILE_CREATE: u32 = 2;
pub const FILE_OPEN_IF: u32 = 3;
pub const FILE_OVERWRITE: u32 = 4;
pub const FILE_OVERWRITE_IF: u32 = 5;

const FILE_SHARE_READ: u32 = 0x1;
const FILE_SHARE_DELETE: u32 = 0x4;

/// Maps an NT creation disposition onto its Win32 `CreateFileW` equivalent,
/// per section 4.9's mapping table. Unrecognized values pass through
/// unchanged, matching the documented behavior for dispositions with no
/// Win32 counterpart.
pub fn nt_disposition_to_win32(nt_disposition: u32) -> u32 {
    match nt_disposition {
        FILE_CREATE => CREATE_NEW,
        FILE_OPEN => OPEN_EXISTING,
        FILE_OPEN_IF => OPEN_ALWAYS,
        FILE_OVERWRITE_IF => CREATE_ALWAYS,
        FILE_OVERWRITE | FILE_SUPERSEDE => TRUNCATE_EXISTING,
        other => other,
    }
}

/// `wants-write` from section 4.9: true if the desired access mask, the
/// (already Win32-mapped) creation disposition, or the create options ask
/// for anything that mutates the target.
pub fn wants_write(desired_access: u32, win32_creation_disposition: u32, create_options: u32) -> bool {
    const WRITE_ACCESS_BITS: u32 =
        GENERIC_ALL | GENERIC_WRITE | DELETE | FILE_WRITE_DATA | FILE_APPEND_DATA | FILE_WRITE_EA | FILE_WRITE_ATTRIBUTES;

    if desired_access & WRITE_ACCESS_BITS != 0 {
        return true;
    }
    if matches!(win32_creation_disposition, CREATE_ALWAYS | TRUNCATE_EXISTING) {
        return true;
    }
    if create_options & FILE_DELETE_ON_CLOSE != 0 {
        return true;
    }
    false
}

/// Forces `FILE_SHARE_DELETE|FILE_SHARE_READ` into a share mode, per
/// section 4.9: hardlink-based caches require the file to remain
/// deletable from another process while this handle is open. `suppress`
/// is the compatibility flag that opts a manifest out of this rewrite.
pub fn force_share_mode(share_mode: u32, suppress: bool) -> u32 {
    if suppress {
        share_mode
    } else {
        share_mode | FILE_SHARE_READ | FILE_SHARE_DELETE
    }
}

/// What the caller's real-API glue should do after the write-side check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// No write was requested; proceed straight to the real open.
    NoWriteRequested,
    /// The write is allowed (or the path is invalid and the denial is
    /// dropped); proceed to the real open with the original access mask.
    ProceedAsRequested,
    /// The write was denied, but a `downgrade-to-read` flag is set and the
    /// path also carries read permission: retry the open as a read-only
    /// request and emit a `ChangedReadWriteToReadAccess` report.
    DowngradeToReadOnly,
    /// The write was denied outright; the real open must not happen.
    Deny(AccessCheckResult),
}

/// The write-check half of the Create/Open decision tree.
pub fn decide_write(
    cursor: &PolicyCursor,
    wants_write: bool,
    probe: impl PathProbe,
    flags: AccessCheckFlags,
    downgrade_enabled: bool,
) -> WriteDecision {
    if !wants_write {
        return WriteDecision::NoWriteRequested;
    }

    match check_write(cursor, probe, flags) {
        None => WriteDecision::ProceedAsRequested,
        Some(result) if result.action == Action::Allow => WriteDecision::ProceedAsRequested,
        Some(result) => {
            if downgrade_enabled && cursor.policy().contains(PolicyFlags::ALLOW_READ) {
                WriteDecision::DowngradeToReadOnly
            } else {
                WriteDecision::Deny(result)
            }
        }
    }
}

/// The read/probe half, run only after the real open has already
/// succeeded (section 4.9: "build a `FileReadContext` from the error and
/// the handle's attributes").
pub fn decide_read(
    cursor: &PolicyCursor,
    existence: Existence,
    opened_directory: bool,
    kind: ReadAccessKind,
    flags: AccessCheckFlags,
) -> AccessCheckResult {
    let read_ctx = FileReadContext::new(existence, opened_directory);
    check_read(cursor, read_ctx, kind, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::{PolicyTree, ROOT};
    use sandbox_core::Usn;
    use std::sync::Arc;

    fn cursor_with(policy: PolicyFlags) -> Arc<PolicyCursor> {
        let mut tree = PolicyTree::new();
        tree.add_record(ROOT, "f".encode_utf16().collect(), policy, policy, None::<Usn>, 0);
        let tree = Arc::new(tree);
        let root = tree.root_cursor();
        PolicyTree::find(&root, &["f".encode_utf16().collect()])
    }

    #[test]
    fn nt_disposition_mapping_matches_the_documented_table() {
        assert_eq!(nt_disposition_to_win32(FILE_CREATE), CREATE_NEW);
        assert_eq!(nt_disposition_to_win32(FILE_OPEN), OPEN_EXISTING);
        assert_eq!(nt_disposition_to_win32(FILE_OPEN_IF), OPEN_ALWAYS);
        assert_eq!(nt_disposition_to_win32(FILE_OVERWRITE_IF), CREATE_ALWAYS);
        assert_eq!(nt_disposition_to_win32(FILE_OVERWRITE), TRUNCATE_EXISTING);
        assert_eq!(nt_disposition_to_win32(FILE_SUPERSEDE), TRUNCATE_EXISTING);
    }

    #[test]
    fn wants_write_true_for_generic_write() {
        assert!(wants_write(GENERIC_WRITE, OPEN_EXISTING, 0));
    }

    #[test]
    fn wants_write_true_for_create_always_with_read_only_access() {
        assert!(wants_write(0, CREATE_ALWAYS, 0));
    }

    #[test]
    fn wants_write_true_for_delete_on_close() {
        assert!(wants_write(0, OPEN_EXISTING, FILE_DELETE_ON_CLOSE));
    }

    #[test]
    fn wants_write_false_for_a_plain_read_open() {
        assert!(!wants_write(0x8000_0000, OPEN_EXISTING, 0));
    }

    #[test]
    fn force_share_mode_adds_read_and_delete_unless_suppressed() {
        assert_eq!(force_share_mode(0, false), FILE_SHARE_READ | FILE_SHARE_DELETE);
        assert_eq!(force_share_mode(0, true), 0);
    }

    #[test]
    fn no_write_requested_short_circuits_the_write_check() {
        let cursor = cursor_with(PolicyFlags::empty());
        let mut probed = false;
        let decision = decide_write(
            &cursor,
            false,
            || {
                probed = true;
                sandbox_core::PathValidity::Valid
            },
            AccessCheckFlags::default(),
            false,
        );
        assert_eq!(decision, WriteDecision::NoWriteRequested);
        assert!(!probed);
    }

    #[test]
    fn denied_write_without_downgrade_is_a_deny() {
        let cursor = cursor_with(PolicyFlags::empty());
        let decision = decide_write(
            &cursor,
            true,
            || sandbox_core::PathValidity::Valid,
            AccessCheckFlags::default(),
            false,
        );
        assert!(matches!(decision, WriteDecision::Deny(_)));
    }

    #[test]
    fn denied_write_with_downgrade_and_read_permission_downgrades() {
        let cursor = cursor_with(PolicyFlags::ALLOW_READ);
        let decision = decide_write(
            &cursor,
            true,
            || sandbox_core::PathValidity::Valid,
            AccessCheckFlags::default(),
            true,
        );
        assert_eq!(decision, WriteDecision::DowngradeToReadOnly);
    }

    #[test]
    fn denied_write_with_downgrade_but_no_read_permission_still_denies() {
        let cursor = cursor_with(PolicyFlags::empty());
        let decision = decide_write(
            &cursor,
            true,
            || sandbox_core::PathValidity::Valid,
            AccessCheckFlags::default(),
            true,
        );
        assert!(matches!(decision, WriteDecision::Deny(_)));
    }

    #[test]
    fn allowed_write_proceeds_as_requested() {
        let cursor = cursor_with(PolicyFlags::ALLOW_WRITE);
        let decision = decide_write(
            &cursor,
            true,
            || sandbox_core::PathValidity::Valid,
            AccessCheckFlags::default(),
            false,
        );
        assert_eq!(decision, WriteDecision::ProceedAsRequested);
    }
}
