//! Canonical path representation shared by every downstream crate.
//!
//! A [`CanonicalPath`] never stores a raw, un-interpreted string: it always
//! carries the prefix class it was parsed under alongside the UTF-16 buffer,
//! matching the wire representation the detoured Win32/NT APIs themselves
//! use internally.

use std::fmt;

/// Which Windows path namespace a path lives in.
///
/// Ordered the way the parser tries them: a leading `\??\` or `\\?\` wins
/// over `\\.\` and the NT-native `\Device\...` form, which in turn win over
/// a bare drive-relative or UNC form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixKind {
    /// `\??\` or `\\?\` — the NT-alias / extended-length win32 prefixes.
    /// `.`/`..` segments are preserved literally; this prefix is never
    /// canonicalized further.
    Win32Nt,
    /// `\\.\` (win32 device namespace alias) or `\Device\...` (a raw NT
    /// device path with no win32 alias resolved). Canonicalized like an
    /// ordinary path but keeps its device prefix.
    LocalDevice,
    /// An ordinary win32 path: `C:\foo`, `\\server\share\foo`, `foo\bar`.
    Win32,
    /// The empty path. Distinct from `Win32` so empty-string edge cases in
    /// the access-check engine can match it without a length check.
    Null,
}

/// An immutable, normalized filesystem path.
///
/// Two `CanonicalPath`s are equal iff they have the same [`PrefixKind`] and
/// their code-unit sequences are equal under NTFS's default case-insensitive
/// (ASCII-only) collation.
#[derive(Debug, Clone)]
pub struct CanonicalPath {
    kind: PrefixKind,
    buf: Vec<u16>,
    prefix_len: usize,
}

impl CanonicalPath {
    pub fn kind(&self) -> PrefixKind {
        self.kind
    }

    pub fn as_units(&self) -> &[u16] {
        &self.buf
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// The path with its type prefix stripped, as originally supplied.
    pub fn without_prefix(&self) -> &[u16] {
        &self.buf[self.prefix_len..]
    }

    pub fn to_os_string(&self) -> std::ffi::OsString {
        decode_wide(&self.buf)
    }

    pub fn root_length(&self) -> usize {
        self.prefix_len
    }

    /// Splits the tail into `\`-separated atoms, skipping the prefix.
    pub fn components(&self) -> Vec<Vec<u16>> {
        let tail = self.without_prefix();
        tail.split(|&c| c == b'\\' as u16)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_vec())
            .collect()
    }

    pub fn last_component(&self) -> Option<Vec<u16>> {
        self.components().pop()
    }

    /// Returns a new path with the last component removed.
    pub fn remove_last_component(&self) -> CanonicalPath {
        let mut comps = self.components();
        comps.pop();
        self.rebuild(comps)
    }

    /// Returns a new path with `atom` appended as a final component.
    pub fn extend(&self, atom: &[u16]) -> CanonicalPath {
        let mut comps = self.components();
        comps.push(atom.to_vec());
        self.rebuild(comps)
    }

    /// Rebuilds `buf` from `comps`, collapsing `.`/`..` segments first —
    /// except for `Win32Nt`, which section 4.1 carves out from further
    /// canonicalization and whose segments are kept exactly as given.
    fn rebuild(&self, comps: Vec<Vec<u16>>) -> CanonicalPath {
        let comps = if self.kind == PrefixKind::Win32Nt {
            comps
        } else {
            collapse_dot_segments(comps)
        };
        let mut buf = self.buf[..self.prefix_len].to_vec();
        for (i, comp) in comps.iter().enumerate() {
            if i > 0 || !buf.is_empty() && *buf.last().unwrap() != b'\\' as u16 {
                buf.push(b'\\' as u16);
            }
            buf.extend_from_slice(comp);
        }
        CanonicalPath {
            kind: self.kind,
            buf,
            prefix_len: self.prefix_len,
        }
    }

    /// Parses a raw UTF-16 path buffer (as handed to a detour) into its
    /// canonical form. Never fails: an unrecognized prefix degrades to
    /// [`PrefixKind::Win32`] with a zero-length prefix, matching the
    /// behavior of treating unknown inputs as ordinary relative paths.
    ///
    /// Separators are normalized to `\` and `.`/`..` segments are collapsed
    /// for every prefix except `Win32Nt`, which is preserved verbatim.
    pub fn parse(raw: &[u16]) -> CanonicalPath {
        if raw.is_empty() {
            return CanonicalPath {
                kind: PrefixKind::Null,
                buf: Vec::new(),
                prefix_len: 0,
            };
        }

        const NT_ALIAS: &[u16] = &[b'\\' as u16, b'?' as u16, b'?' as u16, b'\\' as u16];
        const WIN32_NT_EXTENDED: &[u16] = &[b'\\' as u16, b'\\' as u16, b'?' as u16, b'\\' as u16];
        const WIN32_DEVICE: &[u16] = &[b'\\' as u16, b'\\' as u16, b'.' as u16, b'\\' as u16];
        const DEVICE_PREFIX: &[u16] = &[
            b'\\' as u16,
            b'D' as u16,
            b'e' as u16,
            b'v' as u16,
            b'i' as u16,
            b'c' as u16,
            b'e' as u16,
            b'\\' as u16,
        ];

        if starts_with_ci(raw, NT_ALIAS) || starts_with_ci(raw, WIN32_NT_EXTENDED) {
            return CanonicalPath {
                kind: PrefixKind::Win32Nt,
                buf: raw.to_vec(),
                prefix_len: 4,
            };
        }
        let (kind, prefix_len) = if starts_with_ci(raw, WIN32_DEVICE) {
            (PrefixKind::LocalDevice, 4)
        } else if starts_with_ci(raw, DEVICE_PREFIX) {
            (PrefixKind::LocalDevice, DEVICE_PREFIX.len())
        } else {
            (PrefixKind::Win32, 0)
        };

        let stub = CanonicalPath {
            kind,
            buf: raw[..prefix_len].to_vec(),
            prefix_len,
        };
        let tail: Vec<u16> = raw[prefix_len..]
            .iter()
            .map(|&c| if c == b'/' as u16 { b'\\' as u16 } else { c })
            .collect();
        let components: Vec<Vec<u16>> = tail
            .split(|&c| c == b'\\' as u16)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_vec())
            .collect();
        stub.rebuild(components)
    }

    pub fn from_os_str(s: &std::ffi::OsStr) -> CanonicalPath {
        Self::parse(&encode_wide(s))
    }

    /// Rebuilds a `CanonicalPath` from its constituent parts. Used by
    /// components that compute a new buffer directly (the path translator,
    /// the reparse-point resolver splicing in a target) instead of going
    /// through `extend`/`remove_last_component`.
    pub fn from_parts(kind: PrefixKind, buf: Vec<u16>, prefix_len: usize) -> CanonicalPath {
        CanonicalPath {
            kind,
            buf,
            prefix_len,
        }
    }
}

/// `OsStr` -> UTF-16 that works identically whether or not we are compiled
/// on a Windows host, so the tree/check logic can be unit-tested anywhere.
fn encode_wide(s: &std::ffi::OsStr) -> Vec<u16> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        s.encode_wide().collect()
    }
    #[cfg(not(windows))]
    {
        s.to_string_lossy().encode_utf16().collect()
    }
}

fn decode_wide(buf: &[u16]) -> std::ffi::OsString {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStringExt;
        std::ffi::OsString::from_wide(buf)
    }
    #[cfg(not(windows))]
    {
        std::ffi::OsString::from(String::from_utf16_lossy(buf))
    }
}

fn is_dot(comp: &[u16]) -> bool {
    comp == [b'.' as u16]
}

fn is_dotdot(comp: &[u16]) -> bool {
    comp == [b'.' as u16, b'.' as u16]
}

/// Collapses `.` and `..` segments left-to-right. A `..` with nothing above
/// it to pop (or sitting behind another unresolved `..`) is kept literally —
/// there is no root or cwd context here to resolve it against.
fn collapse_dot_segments(components: Vec<Vec<u16>>) -> Vec<Vec<u16>> {
    let mut stack: Vec<Vec<u16>> = Vec::new();
    for comp in components {
        if is_dot(&comp) {
            continue;
        } else if is_dotdot(&comp) {
            match stack.last() {
                Some(top) if !is_dotdot(top) => {
                    stack.pop();
                }
                _ => stack.push(comp),
            }
        } else {
            stack.push(comp);
        }
    }
    stack
}

fn starts_with_ci(haystack: &[u16], needle: &[u16]) -> bool {
    if haystack.len() < needle.len() {
        return false;
    }
    haystack
        .iter()
        .zip(needle.iter())
        .all(|(&a, &b)| fold(a) == fold(b))
}

fn fold(c: u16) -> u16 {
    if (b'A' as u16..=b'Z' as u16).contains(&c) {
        c + 32
    } else {
        c
    }
}

impl PartialEq for CanonicalPath {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.buf.len() == other.buf.len()
            && self
                .buf
                .iter()
                .zip(other.buf.iter())
                .all(|(&a, &b)| fold(a) == fold(b))
    }
}
impl Eq for CanonicalPath {}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf16_lossy(&self.buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn parses_nt_alias_prefix() {
        let p = CanonicalPath::parse(&w(r"\??\C:\foo\bar"));
        assert_eq!(p.kind(), PrefixKind::Win32Nt);
    }

    #[test]
    fn parses_extended_length_prefix_as_win32_nt() {
        let p = CanonicalPath::parse(&w(r"\\?\C:\foo\bar"));
        assert_eq!(p.kind(), PrefixKind::Win32Nt);
        assert_eq!(p.prefix_len(), 4);
    }

    #[test]
    fn parses_win32_device_prefix_as_local_device() {
        let p = CanonicalPath::parse(&w(r"\\.\PIPE\foo"));
        assert_eq!(p.kind(), PrefixKind::LocalDevice);
        assert_eq!(p.prefix_len(), 4);
    }

    #[test]
    fn parses_device_prefix() {
        let p = CanonicalPath::parse(&w(r"\Device\HarddiskVolume1\foo"));
        assert_eq!(p.kind(), PrefixKind::LocalDevice);
    }

    #[test]
    fn collapses_dotdot_segments_in_win32_paths() {
        let p = CanonicalPath::parse(&w(r"C:\foo\..\bar"));
        assert_eq!(p.to_string(), r"C:\bar");
    }

    #[test]
    fn collapses_dot_segments_in_win32_paths() {
        let p = CanonicalPath::parse(&w(r"C:\foo\.\bar"));
        assert_eq!(p.to_string(), r"C:\foo\bar");
    }

    #[test]
    fn collapses_dotdot_segments_in_local_device_paths_keeping_the_prefix() {
        let p = CanonicalPath::parse(&w(r"\Device\HarddiskVolume1\foo\..\bar"));
        assert_eq!(p.to_string(), r"\Device\HarddiskVolume1\bar");
    }

    #[test]
    fn preserves_dot_segments_literally_for_win32_nt_paths() {
        let p = CanonicalPath::parse(&w(r"\??\C:\foo\..\bar"));
        assert_eq!(p.to_string(), r"\??\C:\foo\..\bar");
    }

    #[test]
    fn normalizes_forward_slashes_in_win32_paths() {
        let p = CanonicalPath::parse(&w(r"C:/foo/bar"));
        assert_eq!(p.to_string(), r"C:\foo\bar");
    }

    #[test]
    fn parses_ordinary_win32_path() {
        let p = CanonicalPath::parse(&w(r"C:\foo\bar"));
        assert_eq!(p.kind(), PrefixKind::Win32);
        assert_eq!(p.prefix_len(), 0);
    }

    #[test]
    fn case_insensitive_equality() {
        let a = CanonicalPath::parse(&w(r"C:\Foo\Bar"));
        let b = CanonicalPath::parse(&w(r"c:\foo\bar"));
        assert_eq!(a, b);
    }

    #[test]
    fn extend_and_remove_last_round_trip() {
        let a = CanonicalPath::parse(&w(r"C:\foo"));
        let extended = a.extend(&w("bar"));
        assert_eq!(extended.last_component(), Some(w("bar")));
        let back = extended.remove_last_component();
        assert_eq!(back, a);
    }

    #[test]
    fn canon_is_idempotent() {
        let raw = w(r"\??\C:\foo\bar\baz");
        let once = CanonicalPath::parse(&raw);
        let twice = CanonicalPath::parse(once.as_units());
        assert_eq!(once, twice);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_path_string() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-zA-Z0-9_.]{1,8}", 0..6).prop_map(|atoms| {
            let mut s = String::new();
            if !atoms.is_empty() {
                s.push_str("C:\\");
                s.push_str(&atoms.join("\\"));
            }
            s
        })
    }

    proptest! {
        /// Section 8: "Canonicalization idempotence" — `canon(canon(p)) == canon(p)`.
        #[test]
        fn canonicalization_is_idempotent(raw in arb_path_string()) {
            let units: Vec<u16> = raw.encode_utf16().collect();
            let once = CanonicalPath::parse(&units);
            let twice = CanonicalPath::parse(once.as_units());
            prop_assert_eq!(once, twice);
        }
    }
}
