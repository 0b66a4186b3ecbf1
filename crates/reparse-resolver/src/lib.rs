//! Reparse-point (symlink/junction) chain resolution (C6): walks a path
//! hop by hop through any prefix reparse points, access-checking and
//! caching each hop, per section 4.6.

pub mod cache;
pub mod chain;
pub mod resolver;

pub use cache::{CacheKey, ResolvedPathCache};
pub use chain::{HopClassification, ResolvedChain, ResolvedHop};
pub use resolver::{resolve_and_enforce, ReparsePointQuery, ReparseTarget, ResolveOutcome};
