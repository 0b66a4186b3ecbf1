//! The policy tree, cursor, access-check engine, and path translator —
//! components C3, C4, and C5 of the sandbox interceptor.

pub mod access_check;
pub mod translate;
pub mod tree;

pub use access_check::{
    check_create_directory, check_read, check_symlink_creation, check_write, ntstatus_for,
    win32_error_for, AccessCheckFlags, PathProbe, ReadAccessKind,
};
pub use translate::{TranslationTable, TranslationTuple};
pub use tree::{ManifestRecord, PolicyCursor, PolicyTree, ROOT};
