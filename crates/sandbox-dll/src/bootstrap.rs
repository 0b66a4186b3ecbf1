//! Process attach/detach: reads the injected manifest, publishes the
//! immutable [`detours::DetourContext`] behind a release barrier, and
//! carries out the internal-error teardown protocol when the manifest
//! itself cannot be trusted.
//!
//! The controller hands the interceptor two pieces of out-of-band state
//! before `CreateProcess` resumes the child: the path to the encoded
//! manifest payload, and the path of the internal-error log the attach
//! routine writes a numeric [`ManifestDecodeError::tag`] to on fatal
//! failure. Both travel via environment variables rather than command-line
//! arguments so they survive a child that rewrites its own argv.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use manifest_decoder::{decode_manifest, GlobalManifestState, ReportDescriptor};
use sandbox_core::SandboxError;

use detours::DetourContext;

/// Environment variable holding the absolute path to the encoded manifest
/// payload the controller wrote before launch.
pub const MANIFEST_PATH_VAR: &str = "SANDBOX_MANIFEST_PATH";
/// Environment variable holding the absolute path of the internal-error
/// log. Present even when the manifest itself fails to decode.
pub const INTERNAL_ERROR_PATH_VAR: &str = "SANDBOX_INTERNAL_ERROR_PATH";

static CONTEXT: OnceCell<DetourContext<File>> = OnceCell::new();

/// Runs once per process, from `DllMain`'s `DLL_PROCESS_ATTACH` (or
/// directly from a test/harness entry point). Returns `Err` exactly when
/// injection must abort: the caller's `DllMain` then returns `FALSE` so
/// `LoadLibrary` fails and the host's own loader unwinds the injection.
pub fn attach() -> Result<(), SandboxError> {
    let internal_error_path = env::var(INTERNAL_ERROR_PATH_VAR).ok();

    let manifest = read_and_decode_manifest().map_err(|err| {
        if let (SandboxError::Manifest(decode_err), Some(path)) = (&err, internal_error_path.as_ref()) {
            report_internal_error(path, decode_err.tag());
        }
        err
    })?;

    let sink = open_report_sink(&manifest.report)?;
    let report = report_channel::ReportChannel::new(sink);
    let context = DetourContext::new(Arc::new(manifest), report, cfg!(target_pointer_width = "64"));

    CONTEXT
        .set(context)
        .map_err(|_| SandboxError::InvalidConfig("attach ran more than once in this process".to_string()))
}

/// The published context, or `None` if `attach` has not run (or failed) on
/// this process — every detour entry point falls through to the real API
/// unconditionally when this is `None`, matching a process that was never
/// meant to be monitored rather than risking a panic mid-build.
pub fn context() -> Option<&'static DetourContext<File>> {
    CONTEXT.get()
}

/// Flushes the report channel at `DLL_PROCESS_DETACH`. Best-effort: a
/// child tearing down after a crash may not get to run this at all, which
/// is why handlers never batch more than one record's worth of buffering
/// between flushes.
pub fn detach() {
    if let Some(ctx) = CONTEXT.get() {
        let _ = ctx.report.flush();
    }
}

fn read_and_decode_manifest() -> Result<GlobalManifestState, SandboxError> {
    let path = env::var(MANIFEST_PATH_VAR)
        .map_err(|_| SandboxError::InvalidConfig(format!("{MANIFEST_PATH_VAR} is not set")))?;
    let bytes = std::fs::read(&path)?;
    Ok(decode_manifest(&bytes)?)
}

fn report_internal_error(path: &str, tag: u32) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{tag}");
    }
}

#[cfg(windows)]
fn open_report_sink(descriptor: &ReportDescriptor) -> Result<File, SandboxError> {
    use std::os::windows::io::FromRawHandle;

    match descriptor {
        ReportDescriptor::Handle(raw) => {
            let raw_handle = *raw as *mut std::ffi::c_void;
            Ok(unsafe { File::from_raw_handle(raw_handle) })
        }
        ReportDescriptor::Path(path) => Ok(OpenOptions::new().create(true).append(true).open(path)?),
        ReportDescriptor::None => Ok(OpenOptions::new().write(true).open("NUL")?),
    }
}

#[cfg(not(windows))]
fn open_report_sink(descriptor: &ReportDescriptor) -> Result<File, SandboxError> {
    match descriptor {
        ReportDescriptor::Path(path) => Ok(OpenOptions::new().create(true).append(true).open(path)?),
        _ => Ok(OpenOptions::new().write(true).open("/dev/null")?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifest_decoder::encode::ManifestBuilder;
    use std::sync::Mutex;

    // Environment variables are process-global state; serialize the tests
    // that touch them so they cannot interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_manifest_path_env_var_is_reported_as_invalid_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var(MANIFEST_PATH_VAR);
        let result = read_and_decode_manifest();
        assert!(matches!(result, Err(SandboxError::InvalidConfig(_))));
    }

    #[test]
    fn a_well_formed_manifest_file_decodes_successfully() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.bin");
        std::fs::write(&manifest_path, ManifestBuilder::new().encode()).unwrap();
        env::set_var(MANIFEST_PATH_VAR, &manifest_path);
        let result = read_and_decode_manifest();
        assert!(result.is_ok());
        env::remove_var(MANIFEST_PATH_VAR);
    }

    #[test]
    fn internal_error_report_writes_the_numeric_tag() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("internal-error.log");
        report_internal_error(log_path.to_str().unwrap(), 4);
        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.trim(), "4");
    }

    #[test]
    fn context_is_none_before_attach_runs() {
        // This test only holds in a process where `attach` never ran;
        // safe here since no other test in this module calls `attach`.
        assert!(context().is_none());
    }
}
