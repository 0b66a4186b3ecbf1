//! Manifest payload decoding (C2): turns the binary blob the detour
//! framework hands the attach routine into a [`GlobalManifestState`].

mod reader;
mod state;
mod tree_codec;

pub mod encode;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use policy_engine::TranslationTable;
use sandbox_core::{ManifestDecodeError, PipId};

pub use reader::Reader;
pub use state::{
    BreakawayDescriptor, DllBlock, GlobalFlags, GlobalManifestState, ReportDescriptor, ShimConfig,
    ShimMatch,
};
pub use tree_codec::decode_tree;

use reader::{
    MAGIC_BREAKAWAY, MAGIC_DEBUG_FLAG, MAGIC_DLL_BLOCK, MAGIC_EXTRA_FLAGS, MAGIC_FLAGS,
    MAGIC_INJECTION_TIMEOUT, MAGIC_INTERNAL_ERROR_FILE, MAGIC_PIP_ID, MAGIC_REPORT, MAGIC_SHIM,
    MAGIC_TRANSLATE,
};

const MIN_INJECTION_TIMEOUT_MINUTES: u32 = 10;

/// Decodes a manifest payload in the fixed sequence given in section 6:
/// debug flag, injection timeout, breakaway list, translation tuples,
/// internal-error path, flags, extra flags, pip id, report descriptor, DLL
/// block, shim descriptor, and finally the policy tree.
///
/// Any magic mismatch is fatal — the caller (the attach routine) is
/// expected to write `ManifestDecodeError::tag()` to the internal-error
/// file and abort injection rather than attach with partial state.
pub fn decode_manifest(payload: &[u8]) -> Result<GlobalManifestState, ManifestDecodeError> {
    let mut r = Reader::new(payload);

    r.expect_magic(MAGIC_DEBUG_FLAG)?;
    let debug_flag = r.read_u8()? != 0;

    r.expect_magic(MAGIC_INJECTION_TIMEOUT)?;
    let timeout_minutes = r.read_u32()?.max(MIN_INJECTION_TIMEOUT_MINUTES);
    let injection_timeout = Duration::from_secs(u64::from(timeout_minutes) * 60);

    r.expect_magic(MAGIC_BREAKAWAY)?;
    let breakaway_count = r.read_u32()?;
    let mut breakaway = Vec::with_capacity(breakaway_count as usize);
    for _ in 0..breakaway_count {
        let image_name = wide_to_string(&r.read_wide_string()?)?;
        let args_raw = wide_to_string(&r.read_wide_string()?)?;
        let flags_byte = r.read_u8()?;
        breakaway.push(BreakawayDescriptor {
            image_name,
            args_substring: if args_raw.is_empty() {
                None
            } else {
                Some(args_raw)
            },
            case_insensitive: flags_byte & 0x1 != 0,
        });
    }

    r.expect_magic(MAGIC_TRANSLATE)?;
    let translate_count = r.read_u32()?;
    let mut tuples = Vec::with_capacity(translate_count as usize);
    for _ in 0..translate_count {
        let from = r.read_wide_string()?;
        let to = r.read_wide_string()?;
        tuples.push(policy_engine::TranslationTuple { from, to });
    }
    let translations = TranslationTable::new(tuples);

    r.expect_magic(MAGIC_INTERNAL_ERROR_FILE)?;
    let internal_error_path = PathBuf::from(wide_to_string(&r.read_wide_string()?)?);

    r.expect_magic(MAGIC_FLAGS)?;
    let flags = GlobalFlags::from_bits_truncate(r.read_u32()?);

    r.expect_magic(MAGIC_EXTRA_FLAGS)?;
    let extra_flags = r.read_u32()?;

    r.expect_magic(MAGIC_PIP_ID)?;
    let pip_id = PipId(r.read_u64()?);

    r.expect_magic(MAGIC_REPORT)?;
    let present = r.read_u32()? != 0;
    let is_handle = r.read_u32()? != 0;
    let report = if is_handle {
        ReportDescriptor::Handle(r.read_u64()?)
    } else if present {
        ReportDescriptor::Path(PathBuf::from(wide_to_string(&r.read_wide_string()?)?))
    } else {
        ReportDescriptor::None
    };

    r.expect_magic(MAGIC_DLL_BLOCK)?;
    let dll32 = PathBuf::from(wide_to_string(&r.read_wide_string()?)?);
    let dll64 = PathBuf::from(wide_to_string(&r.read_wide_string()?)?);
    let dll_block = DllBlock { dll32, dll64 };

    r.expect_magic(MAGIC_SHIM)?;
    let shim_all_processes = r.read_u32()? != 0;
    let shim_path_raw = wide_to_string(&r.read_wide_string()?)?;
    let plugin32_raw = wide_to_string(&r.read_wide_string()?)?;
    let plugin64_raw = wide_to_string(&r.read_wide_string()?)?;
    let match_count = r.read_u32()?;
    let mut matches = Vec::with_capacity(match_count as usize);
    for _ in 0..match_count {
        let image_name = wide_to_string(&r.read_wide_string()?)?;
        let args_raw = wide_to_string(&r.read_wide_string()?)?;
        matches.push(ShimMatch {
            image_name,
            args_substring: if args_raw.is_empty() { None } else { Some(args_raw) },
        });
    }
    let shim = if shim_path_raw.is_empty() {
        None
    } else {
        Some(ShimConfig {
            shim_all_processes,
            shim_path: PathBuf::from(shim_path_raw),
            plugin_path_32: none_if_empty(plugin32_raw),
            plugin_path_64: none_if_empty(plugin64_raw),
            matches,
        })
    };

    let tree = decode_tree(&mut r)?;

    Ok(GlobalManifestState {
        debug_flag,
        injection_timeout,
        breakaway,
        translations,
        internal_error_path,
        flags,
        extra_flags,
        pip_id,
        report,
        dll_block,
        shim,
        tree: Arc::new(tree),
    })
}

fn none_if_empty(s: String) -> Option<PathBuf> {
    if s.is_empty() {
        None
    } else {
        Some(PathBuf::from(s))
    }
}

fn wide_to_string(units: &[u16]) -> Result<String, ManifestDecodeError> {
    String::from_utf16(units).map_err(|_| ManifestDecodeError::InvalidString { offset: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::ManifestBuilder;
    use sandbox_core::PolicyFlags;

    #[test]
    fn round_trips_a_minimal_manifest() {
        let mut builder = ManifestBuilder::new();
        builder.set_pip_id(42);
        builder.set_internal_error_path(r"C:\err.log");
        builder.add_breakaway("conhost.exe", None, true);
        builder.add_translation(r"c:\out", r"c:\real-out");
        builder.add_path(&[], PolicyFlags::ALLOW_READ, PolicyFlags::ALLOW_READ, None);
        let bytes = builder.encode();

        let state = decode_manifest(&bytes).unwrap();
        assert_eq!(state.pip_id, PipId(42));
        assert_eq!(state.breakaway.len(), 1);
        assert_eq!(state.breakaway[0].image_name, "conhost.exe");
        assert!(!state.translations.is_empty());
    }

    #[test]
    fn bad_magic_is_reported_with_a_stable_tag() {
        let bytes = vec![0u8; 4];
        let err = decode_manifest(&bytes).unwrap_err();
        assert_eq!(err.tag(), 2);
    }

    #[test]
    fn truncated_payload_is_reported() {
        let err = decode_manifest(&[]).unwrap_err();
        assert_eq!(err.tag(), 1);
    }
}
