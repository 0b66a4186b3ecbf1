//! The handle overlay table (C7): associates kernel file handles with the
//! policy cursor and access-check result that produced them, for the
//! lifetime of the handle.
//!
//! Backed by [`dashmap::DashMap`] for lock-free reads and serialized
//! single-bucket writes, per section 5's "concurrent map allowing
//! lock-free lookup and serialized insert/remove". The table never owns a
//! handle's lifetime itself — callers are responsible for the ordering
//! invariant in section 4.7: `register` only after the real open returns a
//! valid handle, `retire` strictly before the real close call. That
//! ordering is what keeps the sandbox's table from ever holding a handle
//! value the kernel has already reassigned to someone else.

use std::sync::Arc;

use dashmap::DashMap;

use policy_engine::tree::PolicyCursor;
use sandbox_core::AccessCheckResult;

/// The native handle value, as handed back by `CreateFileW` /
/// `NtCreateFile` / `FindFirstFileExW`. Windows `HANDLE` is `isize`-sized;
/// we store the raw value rather than the handle type itself so this
/// crate has no platform dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandleValue(pub isize);

/// What kind of object a registered handle refers to. `Find` handles are
/// the ones `FindFirstFileExW`/`FindNextFileW` hand back; they are never
/// passed to `CloseHandle`; they are retired by `FindClose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    File,
    Directory,
    Find,
}

/// Per-handle metadata, section 3's "Handle Overlay".
#[derive(Clone)]
pub struct HandleOverlay {
    pub policy_cursor: Arc<PolicyCursor>,
    pub access_check_result: AccessCheckResult,
    pub handle_type: HandleType,
    /// Set once the directory-enumeration access report for this handle's
    /// first `FindFirstFileExW` has been emitted, so `FindNextFileW` does
    /// not re-report the directory itself on every call.
    pub enumeration_reported: bool,
}

impl HandleOverlay {
    pub fn new(
        policy_cursor: Arc<PolicyCursor>,
        access_check_result: AccessCheckResult,
        handle_type: HandleType,
    ) -> Self {
        Self {
            policy_cursor,
            access_check_result,
            handle_type,
            enumeration_reported: false,
        }
    }
}

/// The process-wide table. One instance lives in the `sandbox-dll` bootstrap
/// state and is shared by every detour handler.
#[derive(Default)]
pub struct HandleOverlayTable {
    overlays: DashMap<RawHandleValue, HandleOverlay>,
}

impl HandleOverlayTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `handle` with `overlay`. Called only after the real API
    /// call that produced `handle` has already succeeded.
    pub fn register(&self, handle: RawHandleValue, overlay: HandleOverlay) {
        self.overlays.insert(handle, overlay);
    }

    /// Returns a cloned snapshot of the overlay for `handle`, if any is
    /// registered. Cloning (rather than holding a `dashmap::Ref` across a
    /// detour's own locking) avoids a handler deadlocking against a
    /// concurrent `retire` of the same bucket.
    pub fn lookup(&self, handle: RawHandleValue) -> Option<HandleOverlay> {
        self.overlays.get(&handle).map(|entry| entry.value().clone())
    }

    /// Marks a `Find` handle's directory-enumeration report as already
    /// emitted. No-op if the handle is not registered (it may have been
    /// retired concurrently; the caller's own report will simply not be
    /// deduplicated in that race, which is harmless).
    pub fn mark_enumeration_reported(&self, handle: RawHandleValue) {
        if let Some(mut entry) = self.overlays.get_mut(&handle) {
            entry.enumeration_reported = true;
        }
    }

    /// Removes the overlay for `handle`. Idempotent — retiring a handle
    /// that was never registered, or already retired, is not an error:
    /// the close detour calls this unconditionally before the real close.
    pub fn retire(&self, handle: RawHandleValue) {
        self.overlays.remove(&handle);
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::{PolicyTree, ROOT};
    use sandbox_core::PolicyFlags;

    fn cursor() -> Arc<PolicyCursor> {
        let mut tree = PolicyTree::new();
        tree.add_record(
            ROOT,
            "x".encode_utf16().collect(),
            PolicyFlags::ALLOW_READ,
            PolicyFlags::ALLOW_READ,
            None,
            0,
        );
        let tree = Arc::new(tree);
        tree.root_cursor()
    }

    #[test]
    fn register_then_lookup_finds_the_overlay() {
        let table = HandleOverlayTable::new();
        let overlay = HandleOverlay::new(cursor(), AccessCheckResult::allow(0x1), HandleType::File);
        table.register(RawHandleValue(42), overlay);
        let found = table.lookup(RawHandleValue(42));
        assert!(found.is_some());
        assert_eq!(found.unwrap().handle_type, HandleType::File);
    }

    #[test]
    fn retire_removes_the_overlay() {
        let table = HandleOverlayTable::new();
        let overlay = HandleOverlay::new(cursor(), AccessCheckResult::allow(0x1), HandleType::File);
        table.register(RawHandleValue(7), overlay);
        table.retire(RawHandleValue(7));
        assert!(table.lookup(RawHandleValue(7)).is_none());
    }

    #[test]
    fn retire_is_idempotent() {
        let table = HandleOverlayTable::new();
        table.retire(RawHandleValue(99));
        table.retire(RawHandleValue(99));
        assert!(table.is_empty());
    }

    #[test]
    fn no_overlay_survives_for_a_reused_handle_value_after_retire() {
        // Simulates the kernel reusing a handle value: retire the old
        // overlay, then register a fresh one under the same raw value.
        // Section 8's "handle-table safety": no overlay observable for a
        // value the kernel has already closed unless it has since been
        // re-registered for the *new* object.
        let table = HandleOverlayTable::new();
        let first = HandleOverlay::new(cursor(), AccessCheckResult::allow(0x1), HandleType::File);
        table.register(RawHandleValue(5), first);
        table.retire(RawHandleValue(5));
        assert!(table.lookup(RawHandleValue(5)).is_none());

        let second = HandleOverlay::new(cursor(), AccessCheckResult::allow(0x2), HandleType::Directory);
        table.register(RawHandleValue(5), second);
        let found = table.lookup(RawHandleValue(5)).unwrap();
        assert_eq!(found.handle_type, HandleType::Directory);
    }

    #[test]
    fn find_handle_enumeration_reported_flag_toggles() {
        let table = HandleOverlayTable::new();
        let overlay = HandleOverlay::new(cursor(), AccessCheckResult::allow(0x1), HandleType::Find);
        table.register(RawHandleValue(1), overlay);
        assert!(!table.lookup(RawHandleValue(1)).unwrap().enumeration_reported);
        table.mark_enumeration_reported(RawHandleValue(1));
        assert!(table.lookup(RawHandleValue(1)).unwrap().enumeration_reported);
    }
}
