//! The hierarchical path-policy trie (C3) and its resumable cursor.
//!
//! Records are arena-allocated and children are referenced by index rather
//! than by pointer or `Rc`, per the "reference-counted shared cursors"
//! redesign flag: an arena-plus-index design keeps the tree itself free of
//! any reference-counting machinery. The cursor's *ancestry* chain (used
//! only to resume a search) is the one place shared ownership is still
//! useful, and there it is a strict, non-cyclic parent chain behind `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use sandbox_core::{PolicyFlags, Usn};

/// A node of the policy tree.
///
/// The root record's `atom` is empty; every other record's atom is
/// non-empty, and no two siblings share an atom case-insensitively (this is
/// enforced by `PolicyTree::add_record`, which folds the atom before using
/// it as the children key).
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    pub atom: Vec<u16>,
    pub node_policy: PolicyFlags,
    pub cone_policy: PolicyFlags,
    pub expected_usn: Option<Usn>,
    /// Reserved bucket count from the wire format; informational only —
    /// the in-memory tree does not bucket children itself.
    pub bucket_count: u32,
    children: HashMap<Vec<u16>, usize>,
}

impl ManifestRecord {
    fn root() -> Self {
        Self {
            atom: Vec::new(),
            node_policy: PolicyFlags::empty(),
            cone_policy: PolicyFlags::empty(),
            expected_usn: None,
            bucket_count: 0,
            children: HashMap::new(),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = usize> + '_ {
        self.children.values().copied()
    }
}

fn fold_atom(atom: &[u16]) -> Vec<u16> {
    atom.iter()
        .map(|&c| {
            if (b'A' as u16..=b'Z' as u16).contains(&c) {
                c + 32
            } else {
                c
            }
        })
        .collect()
}

/// Arena holding every record of one manifest's policy tree. Built once at
/// attach time by the manifest decoder (or by `sandbox-cli manifest build`
/// for the dev harness) and never mutated again.
#[derive(Debug, Clone)]
pub struct PolicyTree {
    records: Vec<ManifestRecord>,
}

pub const ROOT: usize = 0;

impl Default for PolicyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyTree {
    pub fn new() -> Self {
        Self {
            records: vec![ManifestRecord::root()],
        }
    }

    pub fn record(&self, index: usize) -> &ManifestRecord {
        &self.records[index]
    }

    /// Appends a new child record under `parent`, keyed by its case-folded
    /// atom. Panics if `parent` already has a sibling with the same atom
    /// (case-insensitively) — the manifest invariant from section 3.
    pub fn add_record(
        &mut self,
        parent: usize,
        atom: Vec<u16>,
        node_policy: PolicyFlags,
        cone_policy: PolicyFlags,
        expected_usn: Option<Usn>,
        bucket_count: u32,
    ) -> usize {
        assert!(!atom.is_empty(), "non-root record must have a non-empty atom");
        let key = fold_atom(&atom);
        let index = self.records.len();
        self.records.push(ManifestRecord {
            atom,
            node_policy,
            cone_policy,
            expected_usn,
            bucket_count,
            children: HashMap::new(),
        });
        let prior = self.records[parent].children.insert(key, index);
        assert!(prior.is_none(), "sibling atoms must be unique case-insensitively");
        index
    }

    /// Sets the root record's own policy and USN. The root is created
    /// empty by `new()`; a decoder that streams the tree depth-first calls
    /// this once before adding any children.
    pub fn set_root_policy(
        &mut self,
        node_policy: PolicyFlags,
        cone_policy: PolicyFlags,
        expected_usn: Option<Usn>,
        bucket_count: u32,
    ) {
        let root = &mut self.records[ROOT];
        root.node_policy = node_policy;
        root.cone_policy = cone_policy;
        root.expected_usn = expected_usn;
        root.bucket_count = bucket_count;
    }

    pub fn root_cursor(self: &Arc<Self>) -> Arc<PolicyCursor> {
        Arc::new(PolicyCursor {
            tree: Arc::clone(self),
            record: ROOT,
            level: 0,
            parent: None,
            truncated: false,
        })
    }

    /// `find(start, path)` — the C3 search. Walks `path` atom by atom from
    /// `start.record`, descending into a matching child at each step;
    /// `truncated` records whether the tree ran out before the path did.
    /// `start.level` seeds the walk so a cursor returned from an earlier,
    /// partial search can be resumed without re-walking its prefix — this
    /// is the "cursor resumability" property from section 8:
    /// `find(root, p1 ++ p2) == find(find(root, p1), p2)`.
    pub fn find(start: &Arc<PolicyCursor>, path: &[Vec<u16>]) -> Arc<PolicyCursor> {
        let tree = Arc::clone(&start.tree);
        let mut cursor = Arc::clone(start);
        let mut truncated = start.truncated;
        for atom in path {
            if truncated {
                // Once the tree has run out, remaining atoms search under
                // the cone policy — there is nothing further to descend
                // into, but we keep extending the level so ancestry stays
                // accurate for resumed searches.
                cursor = Arc::new(PolicyCursor {
                    tree: Arc::clone(&tree),
                    record: cursor.record,
                    level: cursor.level + 1,
                    parent: Some(Arc::clone(&cursor)),
                    truncated: true,
                });
                continue;
            }
            let key = fold_atom(atom);
            match tree.records[cursor.record].children.get(&key) {
                Some(&child) => {
                    cursor = Arc::new(PolicyCursor {
                        tree: Arc::clone(&tree),
                        record: child,
                        level: cursor.level + 1,
                        parent: Some(Arc::clone(&cursor)),
                        truncated: false,
                    });
                }
                None => {
                    truncated = true;
                    cursor = Arc::new(PolicyCursor {
                        tree: Arc::clone(&tree),
                        record: cursor.record,
                        level: cursor.level + 1,
                        parent: Some(Arc::clone(&cursor)),
                        truncated: true,
                    });
                }
            }
        }
        cursor
    }

    /// Sub-cursor lookup used while enumerating a directory: the policy for
    /// one entry is `find(cursor, [atom])` relative to the directory's own
    /// cursor.
    pub fn get_policy_for_subpath(cursor: &Arc<PolicyCursor>, atom: &[u16]) -> Arc<PolicyCursor> {
        Self::find(cursor, std::slice::from_ref(&atom.to_vec()))
    }
}

/// A resumable pointer into the policy tree: the result of searching for
/// some (possibly partial) path.
#[derive(Debug)]
pub struct PolicyCursor {
    tree: Arc<PolicyTree>,
    record: usize,
    level: u32,
    parent: Option<Arc<PolicyCursor>>,
    truncated: bool,
}

impl PolicyCursor {
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn parent(&self) -> Option<&Arc<PolicyCursor>> {
        self.parent.as_ref()
    }

    fn record(&self) -> &ManifestRecord {
        self.tree.record(self.record)
    }

    /// `policy(cursor)` from section 4.3: the cone policy if the search
    /// truncated before reaching a specific node, otherwise the node's own
    /// policy.
    pub fn policy(&self) -> PolicyFlags {
        if self.truncated {
            self.record().cone_policy
        } else {
            self.record().node_policy
        }
    }

    /// `expected-usn(cursor)`: `None` when truncated, since there is no
    /// specific record to carry a version token for.
    pub fn expected_usn(&self) -> Option<Usn> {
        if self.truncated {
            None
        } else {
            self.record().expected_usn
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn path(s: &str) -> Vec<Vec<u16>> {
        s.split('\\').filter(|c| !c.is_empty()).map(w).collect()
    }

    fn build_simple_tree() -> Arc<PolicyTree> {
        let mut tree = PolicyTree::new();
        let c = tree.add_record(ROOT, w("C:"), PolicyFlags::empty(), PolicyFlags::empty(), None, 0);
        let src = tree.add_record(
            c,
            w("src"),
            PolicyFlags::ALLOW_READ,
            PolicyFlags::ALLOW_READ,
            None,
            0,
        );
        tree.add_record(
            src,
            w("a.txt"),
            PolicyFlags::ALLOW_READ | PolicyFlags::ALLOW_WRITE,
            PolicyFlags::empty(),
            Some(Usn(7)),
            0,
        );
        Arc::new(tree)
    }

    #[test]
    fn finds_exact_node_policy() {
        let tree = build_simple_tree();
        let root = tree.root_cursor();
        let cursor = PolicyTree::find(&root, &path(r"C:\src\a.txt"));
        assert!(!cursor.truncated());
        assert!(cursor.policy().contains(PolicyFlags::ALLOW_WRITE));
        assert_eq!(cursor.expected_usn(), Some(Usn(7)));
    }

    #[test]
    fn truncated_search_uses_cone_policy() {
        let tree = build_simple_tree();
        let root = tree.root_cursor();
        let cursor = PolicyTree::find(&root, &path(r"C:\src\deep\nested\file.txt"));
        assert!(cursor.truncated());
        assert!(cursor.policy().contains(PolicyFlags::ALLOW_READ));
        assert_eq!(cursor.expected_usn(), None);
    }

    #[test]
    fn is_case_insensitive() {
        let tree = build_simple_tree();
        let root = tree.root_cursor();
        let cursor = PolicyTree::find(&root, &path(r"c:\SRC\A.TXT"));
        assert!(!cursor.truncated());
        assert!(cursor.policy().contains(PolicyFlags::ALLOW_WRITE));
    }

    #[test]
    fn cursor_resumability() {
        // find(root, p1 ++ p2) == find(find(root, p1), p2)
        let tree = build_simple_tree();
        let root = tree.root_cursor();
        let whole = PolicyTree::find(&root, &path(r"C:\src\a.txt"));
        let half = PolicyTree::find(&root, &path(r"C:\src"));
        let resumed = PolicyTree::find(&half, &path("a.txt"));
        assert_eq!(whole.truncated(), resumed.truncated());
        assert_eq!(whole.policy(), resumed.policy());
        assert_eq!(whole.expected_usn(), resumed.expected_usn());
    }
}
