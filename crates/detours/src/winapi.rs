//! The real Win32/NT glue behind the abstraction traits `policy-engine`
//! and `reparse-resolver` define to stay host-independent and unit
//! testable: [`RealFs`] answers `FSCTL_GET_REPARSE_POINT` queries over a
//! live NTFS volume, and [`probe_path`] answers a plain `PathProbe` from
//! `GetFileAttributesW`. Everything here is inert off Windows — the
//! module still compiles so the rest of the crate can be built and tested
//! anywhere, but [`RealFs`]'s queries always report "not a reparse point"
//! and `probe_path` always reports [`PathValidity::Valid`].

use sandbox_core::{CanonicalPath, PathValidity};

use reparse_resolver::{ReparsePointQuery, ReparseTarget};

/// `FSCTL_GET_REPARSE_POINT` — not exposed by the `windows` crate's stable
/// surface, so kept here as the raw IOCTL code the same way the handful of
/// small reparse-point crates in the wider ecosystem do.
const FSCTL_GET_REPARSE_POINT: u32 = 0x0009_00A8;

const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;
const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;
const SYMLINK_FLAG_RELATIVE: u32 = 0x1;

/// Maximum reparse data payload `DeviceIoControl` will hand back, per
/// `MAXIMUM_REPARSE_DATA_BUFFER_SIZE`.
const MAX_REPARSE_DATA_BUFFER_SIZE: usize = 16 * 1024;

/// Fixed-layout mirror of `REPARSE_DATA_BUFFER`'s symlink/mount-point
/// union member. The `windows` crate does not bind this structure, so it
/// is hand-laid-out here, matching the documented wire layout.
#[repr(C)]
struct ReparseDataBuffer {
    reparse_tag: u32,
    reparse_data_length: u16,
    reserved: u16,
    // Symlink and mount-point members share this layout up through
    // `print_name_length`; only the trailing flags field differs and is
    // read separately below by offset.
    substitute_name_offset: u16,
    substitute_name_length: u16,
    print_name_offset: u16,
    print_name_length: u16,
}

/// Live `ReparsePointQuery` backed by `CreateFileW` + `DeviceIoControl`.
/// Stateless: every query opens and closes its own handle, matching how
/// infrequently reparse-point hops occur relative to ordinary file I/O.
#[derive(Debug, Default)]
pub struct RealFs;

impl ReparsePointQuery for RealFs {
    #[cfg(windows)]
    fn is_reparse_point(&mut self, path: &CanonicalPath) -> bool {
        win32::file_attributes(path)
            .map(|attrs| attrs & FILE_ATTRIBUTE_REPARSE_POINT != 0)
            .unwrap_or(false)
    }

    #[cfg(not(windows))]
    fn is_reparse_point(&mut self, _path: &CanonicalPath) -> bool {
        false
    }

    #[cfg(windows)]
    fn read_target(&mut self, path: &CanonicalPath) -> Option<ReparseTarget> {
        win32::read_reparse_buffer(path).and_then(|buf| parse_reparse_buffer(&buf))
    }

    #[cfg(not(windows))]
    fn read_target(&mut self, _path: &CanonicalPath) -> Option<ReparseTarget> {
        None
    }
}

#[cfg(windows)]
const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x0000_0400;

/// Parses a raw `DeviceIoControl(FSCTL_GET_REPARSE_POINT)` payload into a
/// [`ReparseTarget`], handling symlinks (absolute or relative, per
/// `SYMLINK_FLAG_RELATIVE`) and mount points (always absolute). Any other
/// reparse tag (a filesystem filter's own private tag) is not something
/// this detour can chase and reports `None`, leaving the path unresolved.
fn parse_reparse_buffer(raw: &[u8]) -> Option<ReparseTarget> {
    if raw.len() < std::mem::size_of::<ReparseDataBuffer>() {
        return None;
    }
    let header = unsafe { &*(raw.as_ptr() as *const ReparseDataBuffer) };
    let header_len = std::mem::size_of::<ReparseDataBuffer>();
    let flags_offset = header_len;

    match header.reparse_tag {
        IO_REPARSE_TAG_SYMLINK => {
            let flags = u32::from_le_bytes(raw.get(flags_offset..flags_offset + 4)?.try_into().ok()?);
            let name_start = flags_offset + 4;
            let substitute_name = extract_name(
                raw,
                name_start,
                header.substitute_name_offset,
                header.substitute_name_length,
            )?;
            if flags & SYMLINK_FLAG_RELATIVE != 0 {
                Some(ReparseTarget::Relative(substitute_name))
            } else {
                Some(ReparseTarget::Rooted(CanonicalPath::parse(&substitute_name)))
            }
        }
        IO_REPARSE_TAG_MOUNT_POINT => {
            let name_start = header_len;
            let substitute_name = extract_name(
                raw,
                name_start,
                header.substitute_name_offset,
                header.substitute_name_length,
            )?;
            Some(ReparseTarget::Rooted(CanonicalPath::parse(&substitute_name)))
        }
        _ => None,
    }
}

fn extract_name(raw: &[u8], name_buffer_start: usize, offset: u16, length: u16) -> Option<Vec<u16>> {
    let start = name_buffer_start + offset as usize;
    let end = start + length as usize;
    let bytes = raw.get(start..end)?;
    Some(
        bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect(),
    )
}

/// A [`policy_engine::PathProbe`] backed by `GetFileAttributesW`: `Valid`
/// when the path resolves to any attributes, `PathComponentNotFound` when
/// an intermediate directory is missing, `Invalid` for a malformed path.
/// Off Windows this always reports `Valid` so callers built against it
/// stay host-independent for testing.
#[cfg(windows)]
pub fn probe_path(path: &CanonicalPath) -> PathValidity {
    match win32::file_attributes(path) {
        Some(_) => PathValidity::Valid,
        None => win32::classify_probe_failure(path),
    }
}

#[cfg(not(windows))]
pub fn probe_path(_path: &CanonicalPath) -> PathValidity {
    PathValidity::Valid
}

#[cfg(windows)]
mod win32 {
    use super::{MAX_REPARSE_DATA_BUFFER_SIZE, FSCTL_GET_REPARSE_POINT};
    use sandbox_core::{CanonicalPath, PathValidity};
    use std::os::windows::ffi::OsStrExt;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_PATH_NOT_FOUND, INVALID_HANDLE_VALUE};
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, GetFileAttributesW, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_BACKUP_SEMANTICS,
        FILE_FLAG_OPEN_REPARSE_POINT, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
        OPEN_EXISTING,
    };
    use windows::Win32::System::IO::DeviceIoControl;

    fn wide_null(path: &CanonicalPath) -> Vec<u16> {
        let os = path.to_os_string();
        os.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
    }

    pub fn file_attributes(path: &CanonicalPath) -> Option<u32> {
        let wide = wide_null(path);
        let attrs = unsafe { GetFileAttributesW(PCWSTR(wide.as_ptr())) };
        if attrs == u32::MAX {
            None
        } else {
            Some(attrs)
        }
    }

    pub fn classify_probe_failure(_path: &CanonicalPath) -> PathValidity {
        let err = unsafe { GetLastError() };
        if err == ERROR_PATH_NOT_FOUND {
            PathValidity::PathComponentNotFound
        } else {
            PathValidity::Invalid
        }
    }

    pub fn read_reparse_buffer(path: &CanonicalPath) -> Option<Vec<u8>> {
        let wide = wide_null(path);
        let handle = unsafe {
            CreateFileW(
                PCWSTR(wide.as_ptr()),
                0,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                None,
                OPEN_EXISTING,
                FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
                None,
            )
        }
        .ok()?;
        if handle.is_invalid() || handle == INVALID_HANDLE_VALUE {
            return None;
        }

        let mut buf = vec![0u8; MAX_REPARSE_DATA_BUFFER_SIZE];
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                FSCTL_GET_REPARSE_POINT,
                None,
                0,
                Some(buf.as_mut_ptr() as *mut _),
                buf.len() as u32,
                Some(&mut returned),
                None,
            )
        };
        unsafe {
            let _ = CloseHandle(handle);
        }
        if ok.is_err() {
            return None;
        }
        buf.truncate(returned as usize);
        Some(buf)
    }

    #[allow(dead_code)]
    const _: FILE_ATTRIBUTE_NORMAL = FILE_ATTRIBUTE_NORMAL;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_reparse_tag_is_not_resolved() {
        let mut raw = vec![0u8; 16];
        raw[0..4].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        assert!(parse_reparse_buffer(&raw).is_none());
    }

    #[test]
    fn truncated_buffer_is_not_resolved() {
        assert!(parse_reparse_buffer(&[0u8; 4]).is_none());
    }

    #[test]
    fn mount_point_tag_parses_a_rooted_target() {
        let name: Vec<u16> = r"\??\Volume{guid}\".encode_utf16().collect();
        let name_bytes: Vec<u8> = name.iter().flat_map(|c| c.to_le_bytes()).collect();
        let header_len = std::mem::size_of::<ReparseDataBuffer>();
        let mut raw = vec![0u8; header_len + name_bytes.len()];
        raw[0..4].copy_from_slice(&IO_REPARSE_TAG_MOUNT_POINT.to_le_bytes());
        raw[8..10].copy_from_slice(&0u16.to_le_bytes());
        raw[10..12].copy_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        raw[header_len..].copy_from_slice(&name_bytes);
        match parse_reparse_buffer(&raw) {
            Some(ReparseTarget::Rooted(_)) => {}
            other => panic!("expected a rooted target, got {other:?}"),
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn off_windows_probe_is_always_valid() {
        let path = CanonicalPath::parse(&"C:\\missing".encode_utf16().collect::<Vec<u16>>());
        assert_eq!(probe_path(&path), PathValidity::Valid);
    }
}
