//! `sandbox-cli policy check`: dry-runs the access-check engine (C4)
//! against a decoded manifest without touching a real filesystem or
//! process tree — the same cursor-lookup-then-check pipeline a detour
//! handler runs, minus the real API call at the end.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use manifest_decoder::decode_manifest;
use policy_engine::{check_read, check_write, AccessCheckFlags, PolicyTree, ReadAccessKind};
use sandbox_core::{CanonicalPath, Existence, FileReadContext, PathValidity};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CheckKind {
    Read,
    Probe,
    Enumerate,
    Write,
}

#[derive(Serialize)]
struct CheckOutcome {
    path: String,
    truncated: bool,
    action: String,
    report_level: String,
    validity: String,
}

#[allow(clippy::too_many_arguments)]
pub fn check(
    manifest_path: &Path,
    path: &str,
    kind: CheckKind,
    existent: bool,
    opened_directory: bool,
    fail_unexpected_file_accesses: bool,
    json: bool,
) -> Result<()> {
    let bytes = std::fs::read(manifest_path)
        .with_context(|| format!("read manifest payload {}", manifest_path.display()))?;
    let state = decode_manifest(&bytes).context("decode manifest payload")?;

    let canonical = CanonicalPath::parse(&path.encode_utf16().collect::<Vec<u16>>());
    let atoms = canonical.components();
    let root = state.tree.root_cursor();
    let cursor = PolicyTree::find(&root, &atoms);

    let flags = AccessCheckFlags {
        fail_unexpected_file_accesses,
        ..Default::default()
    };

    let result = match kind {
        CheckKind::Write => check_write(&cursor, || PathValidity::Valid, flags)
            .unwrap_or_else(|| sandbox_core::AccessCheckResult::allow(0)),
        read_kind => {
            let existence = if existent {
                Existence::Existent
            } else {
                Existence::Nonexistent
            };
            let read_ctx = FileReadContext::new(existence, opened_directory);
            let access_kind = match read_kind {
                CheckKind::Read => ReadAccessKind::Read,
                CheckKind::Probe => ReadAccessKind::Probe,
                CheckKind::Enumerate => ReadAccessKind::Enumerate,
                CheckKind::Write => unreachable!(),
            };
            check_read(&cursor, read_ctx, access_kind, flags)
        }
    };

    let outcome = CheckOutcome {
        path: path.to_string(),
        truncated: cursor.truncated(),
        action: format!("{:?}", result.action),
        report_level: format!("{:?}", result.report_level),
        validity: format!("{:?}", result.validity),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!(
            "{} -> action={} report={} validity={} (tree {})",
            outcome.path,
            outcome.action,
            outcome.report_level,
            outcome.validity,
            if outcome.truncated {
                "truncated, used cone policy"
            } else {
                "matched exactly"
            }
        );
    }
    Ok(())
}
