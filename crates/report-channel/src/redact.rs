//! Display-only path redaction for the CLI's replay/view output — never
//! applied to records before they reach the real report channel, only to
//! what a human sees on a terminal.

/// Replaces the current user's profile directory with `~` in `path`, the
/// way a terminal-facing summary should avoid echoing a full home
/// directory back to the operator.
pub fn redact_path(path: &str) -> String {
    for var in ["USERPROFILE", "HOME"] {
        if let Ok(home) = std::env::var(var) {
            if !home.is_empty() && path.to_ascii_lowercase().starts_with(&home.to_ascii_lowercase())
            {
                return format!("~{}", &path[home.len()..]);
            }
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_unrelated_paths_untouched() {
        assert_eq!(redact_path(r"C:\src\a.txt"), r"C:\src\a.txt");
    }
}
