use sandbox_core::CanonicalPath;

/// Whether a hop in a resolved chain is an intermediate reparse-point
/// target (itself subject to further resolution) or the walk's final,
/// fully-resolved destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopClassification {
    Intermediate,
    FullyResolved,
}

#[derive(Debug, Clone)]
pub struct ResolvedHop {
    pub path: CanonicalPath,
    pub classification: HopClassification,
}

/// The cached (and returned) result of resolving one path: whether the
/// source was a reparse point at all, and the ordered chain of hops.
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    pub is_reparse_point: bool,
    pub hops: Vec<ResolvedHop>,
}

impl ResolvedChain {
    pub fn not_a_reparse_point(path: CanonicalPath) -> Self {
        Self {
            is_reparse_point: false,
            hops: vec![ResolvedHop {
                path,
                classification: HopClassification::FullyResolved,
            }],
        }
    }

    pub fn final_path(&self) -> &CanonicalPath {
        &self.hops.last().expect("a resolved chain always has at least one hop").path
    }
}
