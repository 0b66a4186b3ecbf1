//! Shared prologue every path-taking detour runs (section 4.9, steps 2-5).
//! Step 1, the re-entrancy guard, wraps the whole detour entry point and
//! lives in [`crate::guard`].

use std::io::Write;
use std::sync::Arc;

use policy_engine::tree::PolicyCursor;
use policy_engine::PolicyTree;
use reparse_resolver::{resolve_and_enforce, ReparsePointQuery, ResolveOutcome};
use sandbox_core::{AccessCheckResult, CanonicalPath, ReportRecord};

use crate::context::DetourContext;
use crate::special_paths::is_special_path;

/// The outcome of running the shared prologue against one raw path.
pub enum Prologue {
    /// The path was empty, a named pipe, or another special device path:
    /// no policy check applies, the real API runs untouched.
    PassThrough,
    Checked {
        path: CanonicalPath,
        cursor: Arc<PolicyCursor>,
        /// Access-check results for each reparse hop walked on the way to
        /// `path`. The caller reports these before its own check.
        hop_reports: Vec<(CanonicalPath, AccessCheckResult)>,
    },
}

/// Runs steps 2-5 of the shared prologue: special-path rejection, path
/// translation, tree search, and (if enabled) reparse-point resolution
/// re-seating the cursor onto the fully-resolved path.
pub fn run_prologue<W: Write + Send>(
    ctx: &DetourContext<W>,
    raw_path: &CanonicalPath,
    fs: &mut impl ReparsePointQuery,
) -> Prologue {
    if is_special_path(raw_path) {
        return Prologue::PassThrough;
    }

    let translated = ctx.manifest.translations.translate(raw_path);
    let root_cursor = ctx.manifest.tree.root_cursor();

    if !ctx.should_resolve_reparse_points() {
        let cursor = PolicyTree::find(&root_cursor, &translated.components());
        return Prologue::Checked {
            path: translated,
            cursor,
            hop_reports: Vec::new(),
        };
    }

    let ResolveOutcome {
        chain, hop_reports, ..
    } = resolve_and_enforce(
        &translated,
        &root_cursor,
        ctx.access_check_flags(),
        &ctx.manifest.translations,
        fs,
        &ctx.reparse_cache,
        false,
    );
    let final_path = chain.final_path().clone();
    let cursor = PolicyTree::find(&root_cursor, &final_path.components());

    Prologue::Checked {
        path: final_path,
        cursor,
        hop_reports,
    }
}

/// Turns one hop's access-check result into a wire record and emits it,
/// as `ReparsePointTarget` reports the way section 4.6 describes: one
/// report per intermediate hop, before the operation's own check.
pub fn emit_hop_reports<W: Write + Send>(
    ctx: &DetourContext<W>,
    pip_id: u64,
    hops: &[(CanonicalPath, AccessCheckResult)],
) {
    for (path, result) in hops {
        let record = ReportRecord::new(
            sandbox_core::OperationId::next(),
            sandbox_core::CorrelationId::next(),
            sandbox_core::PipId(pip_id),
            "ReparsePointTarget",
            path.to_string(),
            result.access_mask,
            result.action,
            result.report_level,
            0,
            sandbox_core::Usn(0),
        );
        let _ = ctx.report.emit(&record);
    }
}
