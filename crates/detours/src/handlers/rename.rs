//! `MoveFileWithProgress` / `MoveFileEx` / `SetFileInformationByHandle`
//! (`FileRenameInfo`/`FileDispositionInfo`/`FileDispositionInfoEx`) /
//! `CreateHardLink` (section 4.9, "Rename / Link / DispositionInfo /
//! Mode").
//!
//! A rename is delete-on-source plus create-always-on-destination; a link
//! is write-on-destination only. When the source is a directory, every
//! file and directory under it gets the same source-delete/dest-create
//! pair — that is the only way tree-wide dependency changes are surfaced
//! to the controller (section 4.9).

use policy_engine::tree::PolicyCursor;
use policy_engine::{check_write, AccessCheckFlags, PathProbe};
use sandbox_core::AccessCheckResult;

/// The two correlated checks a rename produces: `source` reported as
/// `MoveFileWithProgress_Source` / `Delete`, `destination` as
/// `MoveFileWithProgress_Dest` / `Write`, sharing one correlation id
/// (section 8, scenario 4).
#[derive(Debug, Clone, Copy)]
pub struct RenameDecision {
    pub source: AccessCheckResult,
    pub destination: AccessCheckResult,
}

impl RenameDecision {
    pub fn is_allowed(&self) -> bool {
        self.source.is_allowed() && self.destination.is_allowed()
    }
}

/// One file's rename decision: source must allow delete (`check_write`
/// against the source cursor), destination must allow create-always
/// (`check_write` against the destination cursor). Both checks always run
/// — the caller reports both, even if one alone would have denied the
/// operation — per scenario 4's two-correlated-reports contract.
pub fn decide_rename(
    source_cursor: &PolicyCursor,
    source_probe: impl PathProbe,
    dest_cursor: &PolicyCursor,
    dest_probe: impl PathProbe,
    flags: AccessCheckFlags,
) -> RenameDecision {
    let source = check_write(source_cursor, source_probe, flags).unwrap_or_else(|| AccessCheckResult::allow(0));
    let destination = check_write(dest_cursor, dest_probe, flags).unwrap_or_else(|| AccessCheckResult::allow(0));
    RenameDecision { source, destination }
}

/// A hardlink's decision: write on the destination only (section 4.9: "A
/// link requires a write on the destination only").
pub fn decide_link(
    dest_cursor: &PolicyCursor,
    dest_probe: impl PathProbe,
    flags: AccessCheckFlags,
) -> AccessCheckResult {
    check_write(dest_cursor, dest_probe, flags).unwrap_or_else(|| AccessCheckResult::allow(0))
}

/// Combines the per-file decisions of a recursive directory rename into one
/// overall result via the access-check `combine` algebra (section 4.4),
/// while keeping every individual file's decision available so the caller
/// can still emit one source/dest report pair per file (section 8's
/// open question 3: subtree reports are emitted before the real rename).
pub fn combine_subtree(decisions: impl IntoIterator<Item = RenameDecision>) -> Option<RenameDecision> {
    decisions.into_iter().reduce(|a, b| RenameDecision {
        source: a.source.combine(b.source),
        destination: a.destination.combine(b.destination),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::{PolicyTree, ROOT};
    use sandbox_core::{Action, PathValidity, PolicyFlags};
    use std::sync::Arc;

    fn cursor_with(policy: PolicyFlags) -> Arc<PolicyCursor> {
        let mut tree = PolicyTree::new();
        tree.add_record(ROOT, "f".encode_utf16().collect(), policy, policy, None, 0);
        let tree = Arc::new(tree);
        let root = tree.root_cursor();
        PolicyTree::find(&root, &["f".encode_utf16().collect()])
    }

    #[test]
    fn allowed_rename_when_both_sides_permit() {
        let src = cursor_with(PolicyFlags::ALLOW_WRITE);
        let dst = cursor_with(PolicyFlags::ALLOW_WRITE);
        let decision = decide_rename(
            &src,
            || PathValidity::Valid,
            &dst,
            || PathValidity::Valid,
            AccessCheckFlags::default(),
        );
        assert!(decision.is_allowed());
    }

    #[test]
    fn denied_destination_still_reports_the_source_check() {
        let src = cursor_with(PolicyFlags::ALLOW_WRITE);
        let dst = cursor_with(PolicyFlags::empty());
        let decision = decide_rename(
            &src,
            || PathValidity::Valid,
            &dst,
            || PathValidity::Valid,
            AccessCheckFlags::default(),
        );
        assert_eq!(decision.source.action, Action::Allow);
        assert!(!decision.is_allowed());
    }

    #[test]
    fn link_checks_destination_write_only() {
        let dst = cursor_with(PolicyFlags::ALLOW_WRITE);
        let result = decide_link(&dst, || PathValidity::Valid, AccessCheckFlags::default());
        assert_eq!(result.action, Action::Allow);
    }

    #[test]
    fn combine_subtree_is_most_restrictive_across_all_files() {
        let allowed = RenameDecision {
            source: AccessCheckResult::allow(0x2),
            destination: AccessCheckResult::allow(0x2),
        };
        let denied = RenameDecision {
            source: AccessCheckResult::deny(0x2),
            destination: AccessCheckResult::allow(0x2),
        };
        let combined = combine_subtree([allowed, denied]).unwrap();
        assert_eq!(combined.source.action, Action::Deny);
        assert!(!combined.is_allowed());
    }

    #[test]
    fn combine_subtree_of_nothing_is_none() {
        assert!(combine_subtree(std::iter::empty()).is_none());
    }
}
