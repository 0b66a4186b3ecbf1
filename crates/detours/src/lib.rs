//! Detour handler orchestration (C9).
//!
//! This crate sits directly behind the injected DLL's exported detour
//! functions. It owns the per-process [`context::DetourContext`], the
//! thread-local [`guard`] that stops a detour from re-entering itself
//! through its own real-API calls, the shared access-check prologue and
//! per-API-family decision functions under [`handlers`], the
//! pass-through classification in [`special_paths`], and the live
//! Win32/NT glue in [`winapi`] that the lower crates' testable
//! abstraction traits (`ReparsePointQuery`, `PathProbe`) are backed by
//! outside of tests.
//!
//! Everything exported here is a pure decision function or a thin real-API
//! wrapper; the DLL attach/detach bootstrap that constructs a
//! `DetourContext` from an injected manifest and installs the actual
//! Detours trampolines lives in `sandbox-dll`.

pub mod context;
pub mod guard;
pub mod handlers;
pub mod special_paths;
pub mod winapi;

pub use context::{access_check_flags_from, DetourContext};
pub use guard::{is_reentrant, with_reentrancy_guard};
