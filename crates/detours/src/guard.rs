//! Re-entrancy guard (section 4.9 step 1, section 5's "thread-local flag
//! set on entry to every detour and cleared on exit").
//!
//! A detour that itself calls the real API (path canonicalization probing
//! the filesystem, a reparse-point hop read) would otherwise re-enter its
//! own detour and recurse. `with_reentrancy_guard` makes the detoured path
//! run at most once per thread at a time: a nested call sees the flag
//! already set and takes the `real` branch unconditionally.

use std::cell::Cell;

thread_local! {
    static DETOURED: Cell<bool> = const { Cell::new(false) };
}

/// True if the current thread is already inside a detour's guarded
/// section — i.e. any nested real-API call should not be re-intercepted.
pub fn is_reentrant() -> bool {
    DETOURED.with(|f| f.get())
}

/// Runs `detoured` with the thread-local flag set, or `real` directly if
/// the flag was already set on entry. Every detour entry point should wrap
/// its whole body in this.
pub fn with_reentrancy_guard<T>(real: impl FnOnce() -> T, detoured: impl FnOnce() -> T) -> T {
    if is_reentrant() {
        return real();
    }
    DETOURED.with(|f| f.set(true));
    struct ResetOnDrop;
    impl Drop for ResetOnDrop {
        fn drop(&mut self) {
            DETOURED.with(|f| f.set(false));
        }
    }
    let _reset = ResetOnDrop;
    detoured()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_call_runs_the_detoured_branch() {
        let result = with_reentrancy_guard(|| "real", || "detoured");
        assert_eq!(result, "detoured");
    }

    #[test]
    fn nested_call_runs_the_real_branch() {
        let outer = with_reentrancy_guard(
            || "real",
            || with_reentrancy_guard(|| "inner-real", || "inner-detoured"),
        );
        assert_eq!(outer, "inner-real");
    }

    #[test]
    fn the_flag_is_cleared_after_the_guarded_section_returns() {
        assert!(!is_reentrant());
        with_reentrancy_guard(|| (), || assert!(is_reentrant()));
        assert!(!is_reentrant());
    }

    #[test]
    fn the_flag_is_cleared_even_if_the_detoured_closure_panics() {
        assert!(!is_reentrant());
        let result = std::panic::catch_unwind(|| {
            with_reentrancy_guard(|| (), || panic!("boom"));
        });
        assert!(result.is_err());
        assert!(!is_reentrant());
    }
}
