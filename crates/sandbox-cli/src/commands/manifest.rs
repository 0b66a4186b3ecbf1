//! `sandbox-cli manifest build|decode`: the dev-harness replacement for a
//! real controller's manifest builder (out of scope per spec section 1) —
//! turns a hand-written TOML description into the binary payload section 6
//! specifies, and turns that payload back into something a human can read.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use manifest_decoder::{decode_manifest, GlobalManifestState, ReportDescriptor};

use crate::description::{self, ManifestDescription};

pub fn build(description_path: &Path, output_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(description_path)
        .with_context(|| format!("read manifest description {}", description_path.display()))?;
    let description: ManifestDescription =
        toml::from_str(&raw).context("parse manifest description TOML")?;
    let bytes = description::build(&description).context("encode manifest payload")?;
    std::fs::write(output_path, &bytes)
        .with_context(|| format!("write manifest payload {}", output_path.display()))?;
    println!(
        "wrote {} bytes to {}",
        bytes.len(),
        output_path.display()
    );
    Ok(())
}

pub fn decode(input_path: &Path, json: bool) -> Result<()> {
    let bytes = std::fs::read(input_path)
        .with_context(|| format!("read manifest payload {}", input_path.display()))?;
    let state = decode_manifest(&bytes).context("decode manifest payload")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&DecodedSummary::from(&state))?);
    } else {
        print_human(&state);
    }
    Ok(())
}

/// A `serde`-friendly flattening of [`GlobalManifestState`]'s scalar
/// fields, used only for `manifest decode --json`. The policy tree itself
/// is summarized by record count rather than reproduced wholesale — a full
/// tree dump belongs to `policy check`, which walks it against an actual
/// path.
#[derive(Serialize)]
struct DecodedSummary {
    debug_flag: bool,
    injection_timeout_secs: u64,
    pip_id: u64,
    internal_error_path: String,
    flags: u32,
    extra_flags: u32,
    report: String,
    dll32: String,
    dll64: String,
    breakaway_count: usize,
    translation_count: usize,
    has_shim: bool,
}

impl From<&GlobalManifestState> for DecodedSummary {
    fn from(state: &GlobalManifestState) -> Self {
        Self {
            debug_flag: state.debug_flag,
            injection_timeout_secs: state.injection_timeout.as_secs(),
            pip_id: state.pip_id.0,
            internal_error_path: state.internal_error_path.display().to_string(),
            flags: state.flags.bits(),
            extra_flags: state.extra_flags,
            report: describe_report(&state.report),
            dll32: state.dll_block.dll32.display().to_string(),
            dll64: state.dll_block.dll64.display().to_string(),
            breakaway_count: state.breakaway.len(),
            translation_count: state.translations.len(),
            has_shim: state.shim.is_some(),
        }
    }
}

fn describe_report(report: &ReportDescriptor) -> String {
    match report {
        ReportDescriptor::None => "none".to_string(),
        ReportDescriptor::Handle(h) => format!("handle:{h:#x}"),
        ReportDescriptor::Path(p) => format!("path:{}", p.display()),
    }
}

fn print_human(state: &GlobalManifestState) {
    println!("pip id:             {}", state.pip_id.0);
    println!("debug flag:         {}", state.debug_flag);
    println!(
        "injection timeout:  {}m",
        state.injection_timeout.as_secs() / 60
    );
    println!("global flags:       {:#010x}", state.flags.bits());
    println!("extra flags:        {:#010x}", state.extra_flags);
    println!("internal error log: {}", state.internal_error_path.display());
    println!("report:             {}", describe_report(&state.report));
    println!(
        "dll block:          32-bit {} / 64-bit {}",
        state.dll_block.dll32.display(),
        state.dll_block.dll64.display()
    );
    println!("breakaway entries:  {}", state.breakaway.len());
    for b in &state.breakaway {
        println!(
            "  - {}{}",
            b.image_name,
            b.args_substring
                .as_ref()
                .map(|s| format!(" (args contains {s:?})"))
                .unwrap_or_default()
        );
    }
    println!("translation tuples: {}", state.translations.len());
    match &state.shim {
        Some(shim) => {
            println!(
                "shim:               {} (shim-all={}, {} match entries)",
                shim.shim_path.display(),
                shim.shim_all_processes,
                shim.matches.len()
            );
        }
        None => println!("shim:               none"),
    }
}
