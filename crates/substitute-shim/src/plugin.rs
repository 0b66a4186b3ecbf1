//! Loading and invoking the optional substitute-process-shim plugin,
//! per section 6's plugin ABI:
//! `int CommandMatches(const wchar_t*, const wchar_t*, const wchar_t*,
//! const wchar_t*, wchar_t**, void (*)(const wchar_t*, ...))`.

use libloading::Library;
use thiserror::Error;
use widestring::{U16CString, U16String};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to load plugin library: {0}")]
    Load(#[from] libloading::Error),
    #[error("plugin does not export CommandMatches under any recognized decoration")]
    SymbolNotFound,
    #[error("command, args, cwd or environment block contains an embedded NUL")]
    InvalidString,
}

/// The plugin's log callback. Its C signature is variadic
/// (`void (*)(const wchar_t*, ...)`), which Rust cannot declare or call
/// correctly; every plugin we have seen only ever passes a single
/// pre-formatted string with no substitutions, so `log_sink` below is
/// installed as a fixed single-argument sink.
pub type LogFn = unsafe extern "system" fn(*const u16);

pub type CommandMatchesFn = unsafe extern "system" fn(
    command: *const u16,
    args: *const u16,
    env_block: *const u16,
    cwd: *const u16,
    modified_args_out: *mut *mut u16,
    log: LogFn,
) -> i32;

unsafe extern "system" fn log_sink(_message: *const u16) {
    // Plugin diagnostics have nowhere to go in this host; this is a stub
    // attach point for a future tracing bridge.
}

/// Six pointer-sized arguments on a 32-bit `__stdcall` export mangle to
/// `@24` in the decorated symbol name.
const STDCALL_ARG_BYTES: &str = "24";

/// Resolves the plugin's entry point under each of the three decoration
/// styles a C-ABI shim plugin might export: undecorated `CommandMatches`
/// (x64, or `__cdecl` on x86), `CommandMatches@24` (`__stdcall` on x86),
/// and `_CommandMatches@24` (the MSVC `__stdcall` leading-underscore
/// spelling).
pub fn resolve_command_matches(lib: &Library) -> Result<CommandMatchesFn, PluginError> {
    let candidates = [
        "CommandMatches".to_string(),
        format!("CommandMatches@{STDCALL_ARG_BYTES}"),
        format!("_CommandMatches@{STDCALL_ARG_BYTES}"),
    ];
    for name in &candidates {
        let sym = unsafe { lib.get::<CommandMatchesFn>(name.as_bytes()) };
        if let Ok(sym) = sym {
            return Ok(*sym);
        }
    }
    Err(PluginError::SymbolNotFound)
}

/// Owns a plugin-allocated replacement argument string until the sandbox
/// is done reading it, then frees it back through the allocator the ABI
/// requires: the default process heap, i.e. `LocalFree`.
pub struct ModifiedArgs {
    ptr: *mut u16,
}

impl ModifiedArgs {
    /// `ptr` must be null, or a pointer the plugin allocated on the
    /// default process heap as section 6's plugin ABI requires.
    ///
    /// # Safety
    /// The caller must guarantee `ptr` meets that contract; an
    /// arbitrary non-heap pointer here will corrupt the heap on drop.
    pub unsafe fn from_raw(ptr: *mut u16) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self { ptr })
        }
    }

    pub fn to_wide_string(&self) -> U16String {
        unsafe { U16CString::from_ptr_str(self.ptr).into_ustring() }
    }
}

impl Drop for ModifiedArgs {
    fn drop(&mut self) {
        #[cfg(windows)]
        unsafe {
            use windows::Win32::Foundation::HLOCAL;
            use windows::Win32::System::Memory::LocalFree;
            let _ = LocalFree(Some(HLOCAL(self.ptr as *mut core::ffi::c_void)));
        }
        #[cfg(not(windows))]
        {
            let _ = self.ptr;
        }
    }
}

/// Calls the plugin's `CommandMatches` export. `command`/`args`/`cwd` are
/// encoded as null-terminated UTF-16 inline; `env_block` is the
/// already-double-null-terminated `GetEnvironmentStringsW` block.
///
/// # Safety
/// `matches_fn` must be a valid `CommandMatchesFn` resolved from a
/// library that remains loaded for the duration of the call.
pub unsafe fn call_command_matches(
    matches_fn: CommandMatchesFn,
    command: &str,
    args: &str,
    env_block: &[u16],
    cwd: &str,
) -> Result<(bool, Option<ModifiedArgs>), PluginError> {
    let command = U16CString::from_str(command).map_err(|_| PluginError::InvalidString)?;
    let args_wide = U16CString::from_str(args).map_err(|_| PluginError::InvalidString)?;
    let cwd = U16CString::from_str(cwd).map_err(|_| PluginError::InvalidString)?;

    let mut modified: *mut u16 = std::ptr::null_mut();
    let result = matches_fn(
        command.as_ptr(),
        args_wide.as_ptr(),
        env_block.as_ptr(),
        cwd.as_ptr(),
        &mut modified,
        log_sink,
    );
    let modified = ModifiedArgs::from_raw(modified);
    Ok((result != 0, modified))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdcall_decoration_constant_matches_six_pointer_args() {
        // CommandMatches takes 6 pointer/function-pointer arguments; on a
        // 32-bit `__stdcall` export that is 6 * 4 = 24 bytes of stack.
        assert_eq!(STDCALL_ARG_BYTES, "24");
    }
}
