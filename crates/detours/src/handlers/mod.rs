//! The detour handlers (C9): one module per API family named in
//! section 4.9. Every handler takes a [`crate::context::DetourContext`]
//! plus the operation's native arguments (or, in the testable decision
//! functions below, the already-extracted fields of those arguments) and
//! produces a decision the caller's thin `winapi` glue carries out.

pub mod common;
pub mod create_open;
pub mod create_process;
pub mod delete;
pub mod enumerate;
pub mod rename;
