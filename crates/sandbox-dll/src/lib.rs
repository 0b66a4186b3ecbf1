//! The injected interceptor DLL's entry point.
//!
//! `DllMain` itself does almost nothing: `DLL_PROCESS_ATTACH` runs
//! [`bootstrap::attach`] and aborts the load on failure, and
//! `DLL_PROCESS_DETACH` runs [`bootstrap::detach`] to flush the report
//! channel. Everything else — the actual Detours trampoline installation
//! this DLL would call into on a real Windows host — is out of scope for
//! the pure-Rust side of this crate and lives in the detour framework's
//! own C++ runtime the real build links against; this crate only owns the
//! Rust-side state the trampolines call back into.

pub mod bootstrap;

pub use bootstrap::{attach, context, detach};

#[cfg(windows)]
mod entry {
    use tracing_subscriber::EnvFilter;
    use windows::Win32::Foundation::{BOOL, HINSTANCE};
    use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

    /// The DLL's process-notification entry point, per `DllMain`'s
    /// documented signature. Exported under its exact C name so the
    /// system loader can find it without a `.def` file.
    #[no_mangle]
    #[allow(non_snake_case, clippy::missing_safety_doc)]
    pub unsafe extern "system" fn DllMain(_module: HINSTANCE, call_reason: u32, _reserved: *mut std::ffi::c_void) -> BOOL {
        match call_reason {
            DLL_PROCESS_ATTACH => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(EnvFilter::from_default_env())
                    .try_init();
                match super::bootstrap::attach() {
                    Ok(()) => BOOL(1),
                    Err(err) => {
                        tracing::error!(error = %err, "attach failed, aborting injection");
                        BOOL(0)
                    }
                }
            }
            DLL_PROCESS_DETACH => {
                super::bootstrap::detach();
                BOOL(1)
            }
            _ => BOOL(1),
        }
    }
}
