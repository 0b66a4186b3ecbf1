//! Hop-by-hop reparse-point resolution (C6).
//!
//! The filesystem itself is reached only through [`ReparsePointQuery`] so
//! this crate stays testable without a real NTFS — `detours::winapi`
//! provides the live implementation backed by `FSCTL_GET_REPARSE_POINT` /
//! `DeviceIoControl`.

use std::sync::Arc;

use sandbox_core::{AccessCheckResult, CanonicalPath, Existence, FileReadContext};

use policy_engine::tree::PolicyCursor;
use policy_engine::{check_read, AccessCheckFlags, PolicyTree, ReadAccessKind, TranslationTable};

use crate::cache::{CacheKey, ResolvedPathCache};
use crate::chain::{HopClassification, ResolvedChain, ResolvedHop};

const MAX_CHAIN_HOPS: usize = 64;

/// The reparse target read from one hop: either rooted (replaces the
/// working path wholesale) or relative to the reparse point's own
/// directory.
#[derive(Debug, Clone)]
pub enum ReparseTarget {
    Rooted(CanonicalPath),
    Relative(Vec<u16>),
}

/// Abstraction over the real filesystem calls the resolver needs. Backed
/// in production by `DeviceIoControl(FSCTL_GET_REPARSE_POINT)`; backed in
/// tests by a fixed map.
pub trait ReparsePointQuery {
    fn is_reparse_point(&mut self, path: &CanonicalPath) -> bool;
    fn read_target(&mut self, path: &CanonicalPath) -> Option<ReparseTarget>;
}

#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub chain: ResolvedChain,
    /// One [`AccessCheckResult`] per intermediate hop, in the order they
    /// were produced — the caller turns each into a `ReparsePointTarget`
    /// report before running the operation's own check against the final
    /// path.
    pub hop_reports: Vec<(CanonicalPath, AccessCheckResult)>,
    pub cycle_detected: bool,
}

/// `resolve-and-enforce` from section 4.6.
#[allow(clippy::too_many_arguments)]
pub fn resolve_and_enforce(
    path: &CanonicalPath,
    root_cursor: &Arc<PolicyCursor>,
    flags: AccessCheckFlags,
    translations: &TranslationTable,
    fs: &mut impl ReparsePointQuery,
    cache: &ResolvedPathCache,
    preserve_last_reparse_point: bool,
) -> ResolveOutcome {
    let key = CacheKey::new(&path.to_string(), preserve_last_reparse_point);
    if let Some(chain) = cache.get(&key) {
        return ResolveOutcome {
            chain,
            hop_reports: Vec::new(),
            cycle_detected: false,
        };
    }

    let first_reparse_level = first_level_with_full_parsing(path, root_cursor);
    let Some(first_level) = first_reparse_level else {
        let chain = ResolvedChain::not_a_reparse_point(path.clone());
        cache.insert(key, chain.clone());
        return ResolveOutcome {
            chain,
            hop_reports: Vec::new(),
            cycle_detected: false,
        };
    };

    let mut working = path.clone();
    let mut hops: Vec<ResolvedHop> = Vec::new();
    let mut hop_reports = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut cycle_detected = false;
    let mut saw_any_reparse_point = false;

    'outer: loop {
        let components = working.components();
        let mut current = path_prefix_only(&working);

        for (level, atom) in components.iter().enumerate() {
            current = current.extend(atom);
            let is_final_atom = level + 1 == components.len();
            if is_final_atom && preserve_last_reparse_point {
                break;
            }
            if level < first_level {
                continue;
            }

            let normalized_key = current.to_string().to_ascii_uppercase();
            if !seen.insert(normalized_key) {
                tracing::warn!(path = %current, "reparse chain recurred; stopping resolution");
                cycle_detected = true;
                break 'outer;
            }

            if !fs.is_reparse_point(&current) {
                continue;
            }
            if translations.translate(&current) != current {
                // Filtered out: the manifest's translation table already
                // accounts for this hop, so it is not a "real" reparse
                // point as far as dependency tracking is concerned.
                continue;
            }

            saw_any_reparse_point = true;
            let cursor = PolicyTree::find(root_cursor, &components[..=level]);
            let read_ctx = FileReadContext::new(Existence::Existent, false);
            let result = check_read(&cursor, read_ctx, ReadAccessKind::Probe, flags);
            hop_reports.push((current.clone(), result));
            hops.push(ResolvedHop {
                path: current.clone(),
                classification: HopClassification::Intermediate,
            });

            let Some(target) = fs.read_target(&current) else {
                break 'outer;
            };
            working = splice_target(&current, target);
            continue 'outer;
        }

        // The directory prefix (and, unless preserved, the final atom) is
        // now free of reparse points.
        hops.push(ResolvedHop {
            path: working.clone(),
            classification: HopClassification::FullyResolved,
        });
        break;
    }

    if hops.is_empty() {
        hops.push(ResolvedHop {
            path: working.clone(),
            classification: HopClassification::FullyResolved,
        });
    }
    if hops.len() > MAX_CHAIN_HOPS {
        tracing::warn!(hops = hops.len(), "reparse chain exceeded max hop count, truncating");
        hops.truncate(MAX_CHAIN_HOPS);
    }

    let chain = ResolvedChain {
        is_reparse_point: saw_any_reparse_point,
        hops,
    };
    cache.insert(key, chain.clone());

    ResolveOutcome {
        chain,
        hop_reports,
        cycle_detected,
    }
}

fn path_prefix_only(path: &CanonicalPath) -> CanonicalPath {
    CanonicalPath::from_parts(path.kind(), path.as_units()[..path.prefix_len()].to_vec(), path.prefix_len())
}

fn splice_target(hop: &CanonicalPath, target: ReparseTarget) -> CanonicalPath {
    match target {
        ReparseTarget::Rooted(rooted) => rooted,
        ReparseTarget::Relative(atom) => {
            let parent = hop.remove_last_component();
            parent.extend(&atom)
        }
    }
}

/// `first-level-with-EnableFullReparsePointParsing`: the shallowest prefix
/// level whose cursor policy carries the flag, or `None` if no prefix level
/// enables it (in which case the path is never examined for reparse
/// points).
fn first_level_with_full_parsing(path: &CanonicalPath, root_cursor: &Arc<PolicyCursor>) -> Option<usize> {
    use sandbox_core::PolicyFlags;

    let components = path.components();
    let mut cursor = Arc::clone(root_cursor);
    for (level, atom) in components.iter().enumerate() {
        cursor = PolicyTree::find(&cursor, std::slice::from_ref(atom));
        if cursor.policy().contains(PolicyFlags::ENABLE_FULL_REPARSE_POINT_PARSING) {
            return Some(level);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::{PolicyTree, ROOT};
    use sandbox_core::PolicyFlags;
    use std::collections::HashMap;

    struct FixedFs {
        reparse_points: HashMap<String, ReparseTarget>,
    }

    impl ReparsePointQuery for FixedFs {
        fn is_reparse_point(&mut self, path: &CanonicalPath) -> bool {
            self.reparse_points.contains_key(&path.to_string().to_ascii_uppercase())
        }

        fn read_target(&mut self, path: &CanonicalPath) -> Option<ReparseTarget> {
            self.reparse_points.get(&path.to_string().to_ascii_uppercase()).cloned()
        }
    }

    impl Clone for ReparseTarget {
        fn clone(&self) -> Self {
            match self {
                ReparseTarget::Rooted(p) => ReparseTarget::Rooted(p.clone()),
                ReparseTarget::Relative(a) => ReparseTarget::Relative(a.clone()),
            }
        }
    }

    fn w(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn build_tree() -> Arc<PolicyTree> {
        let mut tree = PolicyTree::new();
        let c = tree.add_record(ROOT, w("C:"), PolicyFlags::empty(), PolicyFlags::empty(), None, 0);
        tree.add_record(
            c,
            w("a"),
            PolicyFlags::ENABLE_FULL_REPARSE_POINT_PARSING,
            PolicyFlags::ENABLE_FULL_REPARSE_POINT_PARSING,
            None,
            0,
        );
        tree.add_record(
            c,
            w("final"),
            PolicyFlags::ALLOW_READ,
            PolicyFlags::ALLOW_READ,
            None,
            0,
        );
        Arc::new(tree)
    }

    #[test]
    fn resolves_a_single_hop_chain() {
        let tree = build_tree();
        let root = tree.root_cursor();
        let mut fs = FixedFs {
            reparse_points: HashMap::from([(
                r"C:\A\LINK".to_string(),
                ReparseTarget::Rooted(CanonicalPath::parse(&w(r"C:\final\f.txt"))),
            )]),
        };
        let path = CanonicalPath::parse(&w(r"C:\a\link"));
        let cache = ResolvedPathCache::default();
        let translations = TranslationTable::default();
        let outcome = resolve_and_enforce(
            &path,
            &root,
            AccessCheckFlags::default(),
            &translations,
            &mut fs,
            &cache,
            false,
        );
        assert!(!outcome.cycle_detected);
        assert_eq!(outcome.hop_reports.len(), 1);
        assert_eq!(outcome.chain.final_path().to_string(), r"C:\final\f.txt");
    }

    #[test]
    fn detects_cycles_without_looping_forever() {
        let tree = build_tree();
        let root = tree.root_cursor();
        let mut fs = FixedFs {
            reparse_points: HashMap::from([
                (
                    r"C:\A\LINK".to_string(),
                    ReparseTarget::Rooted(CanonicalPath::parse(&w(r"C:\a\link2"))),
                ),
                (
                    r"C:\A\LINK2".to_string(),
                    ReparseTarget::Rooted(CanonicalPath::parse(&w(r"C:\a\link"))),
                ),
            ]),
        };
        let path = CanonicalPath::parse(&w(r"C:\a\link"));
        let cache = ResolvedPathCache::default();
        let translations = TranslationTable::default();
        let outcome = resolve_and_enforce(
            &path,
            &root,
            AccessCheckFlags::default(),
            &translations,
            &mut fs,
            &cache,
            false,
        );
        assert!(outcome.cycle_detected);
    }

    #[test]
    fn non_reparse_path_resolves_to_itself() {
        let tree = build_tree();
        let root = tree.root_cursor();
        let mut fs = FixedFs {
            reparse_points: HashMap::new(),
        };
        let path = CanonicalPath::parse(&w(r"C:\a\ordinary.txt"));
        let cache = ResolvedPathCache::default();
        let translations = TranslationTable::default();
        let outcome = resolve_and_enforce(
            &path,
            &root,
            AccessCheckFlags::default(),
            &translations,
            &mut fs,
            &cache,
            false,
        );
        assert!(outcome.hop_reports.is_empty());
        assert_eq!(outcome.chain.final_path(), &path);
    }
}
