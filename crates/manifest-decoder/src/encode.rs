//! The encoder side of the manifest wire format. Exercised by
//! `sandbox-cli manifest build` (turning a TOML description into the binary
//! payload a real controller would hand the interceptor) and by this
//! crate's own round-trip tests.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use sandbox_core::{PolicyFlags, Usn};

use crate::reader::{
    MAGIC_BREAKAWAY, MAGIC_DEBUG_FLAG, MAGIC_DLL_BLOCK, MAGIC_EXTRA_FLAGS, MAGIC_FLAGS,
    MAGIC_INJECTION_TIMEOUT, MAGIC_INTERNAL_ERROR_FILE, MAGIC_PIP_ID, MAGIC_RECORD, MAGIC_REPORT,
    MAGIC_SHIM, MAGIC_TRANSLATE,
};

struct TreeNode {
    atom: Vec<u16>,
    node_policy: PolicyFlags,
    cone_policy: PolicyFlags,
    usn: Option<Usn>,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn new(atom: Vec<u16>) -> Self {
        Self {
            atom,
            node_policy: PolicyFlags::empty(),
            cone_policy: PolicyFlags::empty(),
            usn: None,
            children: Vec::new(),
        }
    }
}

/// Incrementally builds a manifest payload. Every `set_*`/`add_*` call
/// fills in one field from section 6's fixed record sequence; fields left
/// at their default still get encoded so the decoder's magic sequence
/// lines up.
pub struct ManifestBuilder {
    debug_flag: bool,
    injection_timeout_minutes: u32,
    breakaway: Vec<(String, Option<String>, bool)>,
    translations: Vec<(String, String)>,
    internal_error_path: String,
    flags: u32,
    extra_flags: u32,
    pip_id: u64,
    report_path: Option<String>,
    report_handle: Option<u64>,
    dll32: String,
    dll64: String,
    shim_path: Option<String>,
    shim_all_processes: bool,
    plugin_path_32: Option<String>,
    plugin_path_64: Option<String>,
    shim_matches: Vec<(String, Option<String>)>,
    root: TreeNode,
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self {
            debug_flag: false,
            injection_timeout_minutes: 10,
            breakaway: Vec::new(),
            translations: Vec::new(),
            internal_error_path: String::new(),
            flags: 0,
            extra_flags: 0,
            pip_id: 0,
            report_path: None,
            report_handle: None,
            dll32: String::new(),
            dll64: String::new(),
            shim_path: None,
            shim_all_processes: false,
            plugin_path_32: None,
            plugin_path_64: None,
            shim_matches: Vec::new(),
            root: TreeNode::new(Vec::new()),
        }
    }

    pub fn set_debug_flag(&mut self, on: bool) -> &mut Self {
        self.debug_flag = on;
        self
    }

    pub fn set_injection_timeout_minutes(&mut self, minutes: u32) -> &mut Self {
        self.injection_timeout_minutes = minutes;
        self
    }

    pub fn set_pip_id(&mut self, pip_id: u64) -> &mut Self {
        self.pip_id = pip_id;
        self
    }

    pub fn set_internal_error_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.internal_error_path = path.into();
        self
    }

    pub fn set_flags(&mut self, flags: u32) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn set_extra_flags(&mut self, extra_flags: u32) -> &mut Self {
        self.extra_flags = extra_flags;
        self
    }

    pub fn set_report_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.report_path = Some(path.into());
        self.report_handle = None;
        self
    }

    pub fn set_report_handle(&mut self, handle: u64) -> &mut Self {
        self.report_handle = Some(handle);
        self.report_path = None;
        self
    }

    pub fn set_dll_block(&mut self, dll32: impl Into<String>, dll64: impl Into<String>) -> &mut Self {
        self.dll32 = dll32.into();
        self.dll64 = dll64.into();
        self
    }

    pub fn set_shim(
        &mut self,
        shim_path: impl Into<String>,
        shim_all_processes: bool,
        plugin_path_32: Option<String>,
        plugin_path_64: Option<String>,
    ) -> &mut Self {
        self.shim_path = Some(shim_path.into());
        self.shim_all_processes = shim_all_processes;
        self.plugin_path_32 = plugin_path_32;
        self.plugin_path_64 = plugin_path_64;
        self
    }

    pub fn add_shim_match(&mut self, image_name: impl Into<String>, args: Option<String>) -> &mut Self {
        self.shim_matches.push((image_name.into(), args));
        self
    }

    pub fn add_breakaway(
        &mut self,
        image_name: impl Into<String>,
        args_substring: Option<String>,
        case_insensitive: bool,
    ) -> &mut Self {
        self.breakaway
            .push((image_name.into(), args_substring, case_insensitive));
        self
    }

    pub fn add_translation(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.translations.push((from.into(), to.into()));
        self
    }

    /// Inserts (or updates) the policy at `atoms` in the tree, creating any
    /// missing intermediate nodes with an empty policy, matching how a real
    /// manifest builder only emits explicit records for paths the caller
    /// configured.
    pub fn add_path(
        &mut self,
        atoms: &[&str],
        node_policy: PolicyFlags,
        cone_policy: PolicyFlags,
        usn: Option<u64>,
    ) -> &mut Self {
        let mut node = &mut self.root;
        for atom in atoms {
            let key: Vec<u16> = atom.encode_utf16().collect();
            let pos = node.children.iter().position(|c| c.atom == key);
            let idx = match pos {
                Some(i) => i,
                None => {
                    node.children.push(TreeNode::new(key));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx];
        }
        node.node_policy = node_policy;
        node.cone_policy = cone_policy;
        node.usn = usn.map(Usn);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("writing to a Vec never fails");
        buf
    }

    fn write(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        write_magic(out, MAGIC_DEBUG_FLAG);
        out.write_u8(self.debug_flag as u8)?;

        write_magic(out, MAGIC_INJECTION_TIMEOUT);
        out.write_u32::<LittleEndian>(self.injection_timeout_minutes)?;

        write_magic(out, MAGIC_BREAKAWAY);
        out.write_u32::<LittleEndian>(self.breakaway.len() as u32)?;
        for (name, args, case_insensitive) in &self.breakaway {
            write_wide_string(out, name)?;
            write_wide_string(out, args.as_deref().unwrap_or(""))?;
            out.write_u8(if *case_insensitive { 1 } else { 0 })?;
        }

        write_magic(out, MAGIC_TRANSLATE);
        out.write_u32::<LittleEndian>(self.translations.len() as u32)?;
        for (from, to) in &self.translations {
            write_wide_string(out, from)?;
            write_wide_string(out, to)?;
        }

        write_magic(out, MAGIC_INTERNAL_ERROR_FILE);
        write_wide_string(out, &self.internal_error_path)?;

        write_magic(out, MAGIC_FLAGS);
        out.write_u32::<LittleEndian>(self.flags)?;

        write_magic(out, MAGIC_EXTRA_FLAGS);
        out.write_u32::<LittleEndian>(self.extra_flags)?;

        write_magic(out, MAGIC_PIP_ID);
        out.write_u64::<LittleEndian>(self.pip_id)?;

        write_magic(out, MAGIC_REPORT);
        if let Some(handle) = self.report_handle {
            out.write_u32::<LittleEndian>(1)?;
            out.write_u32::<LittleEndian>(1)?;
            out.write_u64::<LittleEndian>(handle)?;
        } else if let Some(path) = &self.report_path {
            out.write_u32::<LittleEndian>(1)?;
            out.write_u32::<LittleEndian>(0)?;
            write_wide_string(out, path)?;
        } else {
            out.write_u32::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(0)?;
        }

        write_magic(out, MAGIC_DLL_BLOCK);
        write_wide_string(out, &self.dll32)?;
        write_wide_string(out, &self.dll64)?;

        write_magic(out, MAGIC_SHIM);
        out.write_u32::<LittleEndian>(self.shim_all_processes as u32)?;
        write_wide_string(out, self.shim_path.as_deref().unwrap_or(""))?;
        write_wide_string(out, self.plugin_path_32.as_deref().unwrap_or(""))?;
        write_wide_string(out, self.plugin_path_64.as_deref().unwrap_or(""))?;
        out.write_u32::<LittleEndian>(self.shim_matches.len() as u32)?;
        for (name, args) in &self.shim_matches {
            write_wide_string(out, name)?;
            write_wide_string(out, args.as_deref().unwrap_or(""))?;
        }

        write_magic(out, MAGIC_RECORD);
        write_record_fields(out, &self.root)?;
        out.write_u32::<LittleEndian>(self.root.children.len() as u32)?;
        for child in &self.root.children {
            write_subtree(out, child)?;
        }

        Ok(())
    }
}

fn write_subtree(out: &mut Vec<u8>, node: &TreeNode) -> std::io::Result<()> {
    write_magic(out, MAGIC_RECORD);
    write_wide_units(out, &node.atom)?;
    write_record_fields(out, node)?;
    out.write_u32::<LittleEndian>(node.children.len() as u32)?;
    for child in &node.children {
        write_subtree(out, child)?;
    }
    Ok(())
}

fn write_record_fields(out: &mut Vec<u8>, node: &TreeNode) -> std::io::Result<()> {
    out.write_u32::<LittleEndian>(node.node_policy.bits())?;
    out.write_u32::<LittleEndian>(node.cone_policy.bits())?;
    match node.usn {
        Some(usn) => {
            out.write_u8(1)?;
            out.write_u64::<LittleEndian>(usn.0)?;
        }
        None => out.write_u8(0)?,
    }
    out.write_u32::<LittleEndian>(0) // bucket_count: informational, unused by the in-memory tree
}

fn write_magic(out: &mut Vec<u8>, magic: u32) {
    out.write_u32::<LittleEndian>(magic).expect("writing to a Vec never fails");
}

fn write_wide_string(out: &mut Vec<u8>, s: &str) -> std::io::Result<()> {
    let units: Vec<u16> = s.encode_utf16().collect();
    write_wide_units(out, &units)
}

fn write_wide_units(out: &mut Vec<u8>, units: &[u16]) -> std::io::Result<()> {
    out.write_u32::<LittleEndian>(units.len() as u32)?;
    for &u in units {
        out.write_u16::<LittleEndian>(u)?;
    }
    Ok(())
}
