//! `FindFirstFileExW` / `FindNextFileW` / `NtQueryDirectoryFile` /
//! `ZwQueryDirectoryFile` (section 4.9, "Enumerate").
//!
//! The directory itself is access-checked as an enumeration; the pattern's
//! filter half is either a literal probe (no wildcard) or an enumeration
//! probe, and every entry the real call yields is checked against its own
//! sub-policy as an `EnumerationProbe`, which — per section 4.4 — never
//! escalates to `Deny`.

use policy_engine::tree::PolicyCursor;
use policy_engine::{check_read, AccessCheckFlags, PolicyTree, ReadAccessKind};
use sandbox_core::{AccessCheckResult, Existence, FileReadContext};

/// Splits a find pattern (`dir\*.cpp`, `dir\file.txt`) into its directory
/// and filter halves, and classifies the filter as literal or wildcarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPattern {
    pub directory: Vec<u16>,
    pub filter: Vec<u16>,
    pub is_wildcard: bool,
}

pub fn split_pattern(pattern: &[u16]) -> SplitPattern {
    let sep = b'\\' as u16;
    let last_sep = pattern.iter().rposition(|&c| c == sep);
    let (directory, filter) = match last_sep {
        Some(i) => (pattern[..i].to_vec(), pattern[i + 1..].to_vec()),
        None => (Vec::new(), pattern.to_vec()),
    };
    let is_wildcard = filter.iter().any(|&c| c == b'*' as u16 || c == b'?' as u16);
    SplitPattern {
        directory,
        filter,
        is_wildcard,
    }
}

/// The enumeration access check against the directory itself. Always run
/// as `ReadAccessKind::Enumerate` — the directory-open special case inside
/// `check_read` (directory opens are always allowed) still applies, so
/// this mostly governs whether the access gets reported at all
/// (`ReportDirectoryEnumeration`/`REPORT_ACCESS*` flags on the cursor).
pub fn check_directory_enumeration(
    cursor: &PolicyCursor,
    flags: AccessCheckFlags,
) -> AccessCheckResult {
    let ctx = FileReadContext::new(Existence::Existent, true);
    check_read(cursor, ctx, ReadAccessKind::Enumerate, flags)
}

/// The filter half's own check, before any entries are enumerated: a
/// literal (non-wildcard) filter is a plain probe against its own
/// sub-cursor; a wildcarded filter has no single target to probe and is
/// folded into the per-entry checks instead.
pub fn check_filter(
    directory_cursor: &std::sync::Arc<PolicyCursor>,
    pattern: &SplitPattern,
    existence: Existence,
    flags: AccessCheckFlags,
) -> Option<AccessCheckResult> {
    if pattern.is_wildcard || pattern.filter.is_empty() {
        return None;
    }
    let cursor = PolicyTree::get_policy_for_subpath(directory_cursor, &pattern.filter);
    let ctx = FileReadContext::new(existence, false);
    Some(check_read(&cursor, ctx, ReadAccessKind::Probe, flags))
}

/// One enumerated entry's access check — always `EnumerationProbe`, so it
/// never denies the overall enumeration (section 4.4's back-compat
/// clause), only optionally reports it.
pub fn check_entry(
    directory_cursor: &std::sync::Arc<PolicyCursor>,
    entry_name: &[u16],
    existence: Existence,
    flags: AccessCheckFlags,
) -> AccessCheckResult {
    let cursor = PolicyTree::get_policy_for_subpath(directory_cursor, entry_name);
    let ctx = FileReadContext::new(existence, false);
    check_read(&cursor, ctx, ReadAccessKind::EnumerationProbe, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::ROOT;
    use sandbox_core::PolicyFlags;

    fn w(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn splits_wildcard_pattern() {
        let split = split_pattern(&w(r"C:\src\*.cpp"));
        assert_eq!(split.directory, w(r"C:\src"));
        assert_eq!(split.filter, w("*.cpp"));
        assert!(split.is_wildcard);
    }

    #[test]
    fn splits_literal_pattern() {
        let split = split_pattern(&w(r"C:\src\a.cpp"));
        assert_eq!(split.directory, w(r"C:\src"));
        assert_eq!(split.filter, w("a.cpp"));
        assert!(!split.is_wildcard);
    }

    #[test]
    fn pattern_with_no_directory_component() {
        let split = split_pattern(&w("*.cpp"));
        assert!(split.directory.is_empty());
        assert_eq!(split.filter, w("*.cpp"));
    }

    #[test]
    fn enumeration_probe_never_denies_even_with_fail_unexpected() {
        let mut tree = PolicyTree::new();
        tree.add_record(
            ROOT,
            w("src"),
            PolicyFlags::empty(),
            PolicyFlags::empty(),
            None,
            0,
        );
        let tree = std::sync::Arc::new(tree);
        let root = tree.root_cursor();
        let dir_cursor = PolicyTree::find(&root, &[w("src")]);
        let flags = AccessCheckFlags {
            fail_unexpected_file_accesses: true,
            ..Default::default()
        };
        let result = check_entry(&dir_cursor, &w("a.cpp"), Existence::Existent, flags);
        assert_ne!(result.action, sandbox_core::Action::Deny);
    }

    #[test]
    fn wildcard_filter_has_no_standalone_check() {
        let mut tree = PolicyTree::new();
        tree.add_record(ROOT, w("src"), PolicyFlags::empty(), PolicyFlags::empty(), None, 0);
        let tree = std::sync::Arc::new(tree);
        let root = tree.root_cursor();
        let dir_cursor = PolicyTree::find(&root, &[w("src")]);
        let pattern = split_pattern(&w("*.cpp"));
        assert!(check_filter(&dir_cursor, &pattern, Existence::Existent, AccessCheckFlags::default()).is_none());
    }

    #[test]
    fn literal_filter_is_probed_against_its_sub_cursor() {
        let mut tree = PolicyTree::new();
        let src = tree.add_record(ROOT, w("src"), PolicyFlags::empty(), PolicyFlags::empty(), None, 0);
        tree.add_record(src, w("a.cpp"), PolicyFlags::ALLOW_READ, PolicyFlags::empty(), None, 0);
        let tree = std::sync::Arc::new(tree);
        let root = tree.root_cursor();
        let dir_cursor = PolicyTree::find(&root, &[w("src")]);
        let pattern = split_pattern(&w(r"C:\src\a.cpp"));
        let result = check_filter(&dir_cursor, &pattern, Existence::Existent, AccessCheckFlags::default());
        assert_eq!(result.unwrap().action, sandbox_core::Action::Allow);
    }

    #[test]
    fn directory_enumeration_check_always_allows_the_open() {
        let mut tree = PolicyTree::new();
        tree.add_record(
            ROOT,
            w("src"),
            PolicyFlags::empty(),
            PolicyFlags::empty(),
            None,
            0,
        );
        let tree = std::sync::Arc::new(tree);
        let root = tree.root_cursor();
        let dir_cursor = PolicyTree::find(&root, &[w("src")]);
        let result = check_directory_enumeration(&dir_cursor, AccessCheckFlags::default());
        assert_eq!(result.action, sandbox_core::Action::Allow);
    }
}
