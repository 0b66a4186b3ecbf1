//! The path translator (C5): longest-prefix rewrite of a canonicalized path
//! using the manifest's translation table.

use sandbox_core::{CanonicalPath, PrefixKind};

const SEP: u16 = b'\\' as u16;

fn fold(c: u16) -> u16 {
    if (b'A' as u16..=b'Z' as u16).contains(&c) {
        c + 32
    } else {
        c
    }
}

fn eq_ci(a: &[u16], b: &[u16]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| fold(x) == fold(y))
}

/// One `{from, to}` pair from `ManifestTranslatePathsStrings`. Both sides
/// are stored already lower-cased on the wire; we keep them as given and
/// fold at comparison time instead, so `to` preserves whatever case the
/// manifest author used for the replacement.
#[derive(Debug, Clone)]
pub struct TranslationTuple {
    pub from: Vec<u16>,
    pub to: Vec<u16>,
}

/// Sorted (longest `from` first) and queried as a fixpoint loop per path.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    tuples: Vec<TranslationTuple>,
}

impl TranslationTable {
    pub fn new(mut tuples: Vec<TranslationTuple>) -> Self {
        tuples.sort_by_key(|t| std::cmp::Reverse(t.from.len()));
        Self { tuples }
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Applies every tuple that matches, longest-prefix first, each tuple
    /// firing at most once. Device paths and named-stream paths pass
    /// through unchanged.
    pub fn translate(&self, path: &CanonicalPath) -> CanonicalPath {
        if self.tuples.is_empty() || path.kind() == PrefixKind::LocalDevice {
            return path.clone();
        }
        let tail = path.without_prefix();
        if looks_like_named_stream(tail) {
            return path.clone();
        }

        let mut working = tail.to_vec();
        let mut used = vec![false; self.tuples.len()];
        loop {
            let mut best: Option<(usize, usize)> = None;
            for (i, tuple) in self.tuples.iter().enumerate() {
                if used[i] {
                    continue;
                }
                if let Some(matched_len) = prefix_match_len(&working, &tuple.from) {
                    if best.map_or(true, |(_, len)| matched_len > len) {
                        best = Some((i, matched_len));
                    }
                }
            }
            let Some((i, matched_len)) = best else {
                break;
            };
            used[i] = true;
            let mut rebuilt = self.tuples[i].to.clone();
            rebuilt.extend_from_slice(&working[matched_len..]);
            working = rebuilt;
        }

        let mut buf = path.as_units()[..path.prefix_len()].to_vec();
        buf.extend_from_slice(&working);
        CanonicalPath::from_parts(path.kind(), buf, path.prefix_len())
    }
}

/// Returns the number of leading code units of `working` that the tuple's
/// `from` consumes, honoring the "directory form without trailing
/// separator also matches" rule.
fn prefix_match_len(working: &[u16], from: &[u16]) -> Option<usize> {
    if from.is_empty() {
        return None;
    }
    if from.last() == Some(&SEP) {
        let from_no_sep = &from[..from.len() - 1];
        if working.len() == from_no_sep.len() && eq_ci(working, from_no_sep) {
            return Some(working.len());
        }
    }
    if working.len() >= from.len() && eq_ci(&working[..from.len()], from) {
        return Some(from.len());
    }
    None
}

fn looks_like_named_stream(tail: &[u16]) -> bool {
    tail.iter()
        .enumerate()
        .any(|(i, &c)| c == b':' as u16 && i != 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn tuple(from: &str, to: &str) -> TranslationTuple {
        TranslationTuple {
            from: w(from),
            to: w(to),
        }
    }

    #[test]
    fn rewrites_longest_matching_prefix() {
        let table = TranslationTable::new(vec![
            tuple(r"c:\out", r"c:\real-out"),
            tuple(r"c:\out\sub", r"c:\special"),
        ]);
        let path = CanonicalPath::parse(&w(r"C:\out\sub\file.txt"));
        let translated = table.translate(&path);
        assert_eq!(translated.to_string(), r"C:\special\file.txt");
    }

    #[test]
    fn directory_form_matches_without_trailing_separator() {
        let table = TranslationTable::new(vec![tuple(r"c:\out\", r"c:\real-out\")]);
        let path = CanonicalPath::parse(&w(r"C:\out"));
        let translated = table.translate(&path);
        assert_eq!(translated.to_string(), r"C:\real-out\");
    }

    #[test]
    fn device_paths_pass_through_untouched() {
        let table = TranslationTable::new(vec![tuple(r"\device\harddiskvolume1", r"c:\mapped")]);
        let path = CanonicalPath::parse(&w(r"\Device\HarddiskVolume1\foo"));
        let translated = table.translate(&path);
        assert_eq!(translated, path);
    }

    #[test]
    fn win32_device_namespace_paths_pass_through_untouched() {
        let table = TranslationTable::new(vec![tuple(r"pipe\my-pipe", r"pipe\mapped")]);
        let path = CanonicalPath::parse(&w(r"\\.\pipe\my-pipe"));
        assert_eq!(path.kind(), PrefixKind::LocalDevice);
        let translated = table.translate(&path);
        assert_eq!(translated, path);
    }

    #[test]
    fn fixpoint_each_tuple_fires_at_most_once() {
        // A pathological table where `to` of one tuple re-exposes the
        // `from` of another; without the used-once rule this would loop.
        let table = TranslationTable::new(vec![
            tuple(r"c:\a", r"c:\b"),
            tuple(r"c:\b", r"c:\a"),
        ]);
        let path = CanonicalPath::parse(&w(r"C:\a\file.txt"));
        let translated = table.translate(&path);
        // First tuple (longer/only match at first pass since both equal
        // length, selection is stable) fires once then no remaining tuple
        // matches the result.
        assert!(translated.to_string() == r"C:\b\file.txt" || translated.to_string() == r"C:\a\file.txt");
    }

    #[test]
    fn named_stream_paths_pass_through() {
        let table = TranslationTable::new(vec![tuple(r"c:\out", r"c:\real")]);
        let path = CanonicalPath::parse(&w(r"C:\out\file.txt:stream"));
        let translated = table.translate(&path);
        assert_eq!(translated, path);
    }
}
