//! A cursor over the manifest payload's little-endian byte stream.

use byteorder::{ByteOrder, LittleEndian};
use sandbox_core::ManifestDecodeError;

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ManifestDecodeError> {
        if self.buf.len() - self.pos < len {
            return Err(ManifestDecodeError::Truncated { offset: self.pos });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ManifestDecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, ManifestDecodeError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, ManifestDecodeError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_u16(&mut self) -> Result<u16, ManifestDecodeError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    /// Reads a `u32` length followed by that many UTF-16 code units, as
    /// every string in the manifest is encoded.
    pub fn read_wide_string(&mut self) -> Result<Vec<u16>, ManifestDecodeError> {
        let len = self.read_u32()? as usize;
        let mut units = Vec::with_capacity(len);
        for _ in 0..len {
            units.push(self.read_u16()?);
        }
        Ok(units)
    }

    pub fn read_os_string(&mut self) -> Result<std::ffi::OsString, ManifestDecodeError> {
        let units = self.read_wide_string()?;
        decode_wide(&units)
    }

    /// Validates the fixed magic tag that precedes every record, per
    /// section 2's "Each record self-identifying by a small magic plus
    /// size" and section 6's per-record magic validation.
    pub fn expect_magic(&mut self, expected: u32) -> Result<(), ManifestDecodeError> {
        let found = self.read_u32()?;
        if found != expected {
            return Err(ManifestDecodeError::BadMagic { expected, found });
        }
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.pos
    }
}

fn decode_wide(units: &[u16]) -> Result<std::ffi::OsString, ManifestDecodeError> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStringExt;
        Ok(std::ffi::OsString::from_wide(units))
    }
    #[cfg(not(windows))]
    {
        String::from_utf16(units)
            .map(std::ffi::OsString::from)
            .map_err(|_| ManifestDecodeError::InvalidString { offset: 0 })
    }
}

/// Compile-time magic tags, one per record kind, matching the little-endian
/// bytes of a 4-character ASCII mnemonic — easy to spot in a hex dump.
pub const MAGIC_DEBUG_FLAG: u32 = tag(b"MDBG");
pub const MAGIC_INJECTION_TIMEOUT: u32 = tag(b"MTMO");
pub const MAGIC_BREAKAWAY: u32 = tag(b"MBRK");
pub const MAGIC_TRANSLATE: u32 = tag(b"MTRX");
pub const MAGIC_INTERNAL_ERROR_FILE: u32 = tag(b"MIEF");
pub const MAGIC_FLAGS: u32 = tag(b"MFLG");
pub const MAGIC_EXTRA_FLAGS: u32 = tag(b"MXFG");
pub const MAGIC_PIP_ID: u32 = tag(b"MPID");
pub const MAGIC_REPORT: u32 = tag(b"MRPT");
pub const MAGIC_DLL_BLOCK: u32 = tag(b"MDLL");
pub const MAGIC_SHIM: u32 = tag(b"MSHM");
pub const MAGIC_RECORD: u32 = tag(b"MTRE");

const fn tag(bytes: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*bytes)
}
