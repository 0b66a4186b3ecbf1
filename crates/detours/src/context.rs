//! The per-process context every detour handler is constructed against:
//! the immutable global manifest state plus the mutable shared structures
//! (handle table, resolved-path cache, report channel).

use std::io::Write;
use std::sync::Arc;

use handle_table::HandleOverlayTable;
use manifest_decoder::{GlobalFlags, GlobalManifestState};
use policy_engine::AccessCheckFlags;
use reparse_resolver::ResolvedPathCache;
use report_channel::ReportChannel;

/// Everything a detour handler needs beyond its own call's native
/// arguments. One instance is built during attach and shared (by
/// reference) with every detour for the lifetime of the process.
pub struct DetourContext<W: Write + Send> {
    pub manifest: Arc<GlobalManifestState>,
    pub handles: HandleOverlayTable,
    pub reparse_cache: ResolvedPathCache,
    pub report: ReportChannel<W>,
    pub is_64_bit_host: bool,
}

impl<W: Write + Send> DetourContext<W> {
    pub fn new(
        manifest: Arc<GlobalManifestState>,
        report: ReportChannel<W>,
        is_64_bit_host: bool,
    ) -> Self {
        Self {
            manifest,
            handles: HandleOverlayTable::new(),
            reparse_cache: ResolvedPathCache::default(),
            report,
            is_64_bit_host,
        }
    }

    /// The access-check flags derived from the manifest's global flag
    /// word, consulted by every `check_read`/`check_write` call.
    pub fn access_check_flags(&self) -> AccessCheckFlags {
        access_check_flags_from(self.manifest.flags)
    }

    /// Whether reparse-point resolution should run at all (section 4.9
    /// step 5): suppressed entirely by the `IGNORE_REPARSE_POINTS` flag.
    pub fn should_resolve_reparse_points(&self) -> bool {
        !self.manifest.flags.contains(GlobalFlags::IGNORE_REPARSE_POINTS)
    }

    /// Whether a denied write should be retried as a read-only open
    /// (section 4.9's `ChangedReadWriteToReadAccess` downgrade).
    pub fn downgrade_write_to_read(&self) -> bool {
        self.manifest.flags.contains(GlobalFlags::DOWNGRADE_WRITE_TO_READ)
    }
}

/// Maps the manifest's process-wide flag word onto the access-check
/// engine's own flag set; the two are separate types because
/// `policy-engine` does not depend on `manifest-decoder`.
pub fn access_check_flags_from(flags: GlobalFlags) -> AccessCheckFlags {
    AccessCheckFlags {
        fail_unexpected_file_accesses: flags.contains(GlobalFlags::FAIL_UNEXPECTED_FILE_ACCESSES),
        explicitly_report_directory_probes: flags
            .contains(GlobalFlags::EXPLICITLY_REPORT_DIRECTORY_PROBES),
        report_any_access: flags.contains(GlobalFlags::REPORT_ALL_ACCESSES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_fail_unexpected_file_accesses() {
        let flags = access_check_flags_from(GlobalFlags::FAIL_UNEXPECTED_FILE_ACCESSES);
        assert!(flags.fail_unexpected_file_accesses);
        assert!(!flags.report_any_access);
    }

    #[test]
    fn maps_report_all_accesses() {
        let flags = access_check_flags_from(GlobalFlags::REPORT_ALL_ACCESSES);
        assert!(flags.report_any_access);
    }
}
