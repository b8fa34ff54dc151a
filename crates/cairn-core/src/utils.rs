//! Shared utility functions for Cairn crates

use anyhow::anyhow;
use std::path::PathBuf;

/// Maximum length of a sanitized file stem
const MAX_FILENAME_LEN: usize = 200;

/// Number of token characters shown in log previews
const TOKEN_PREVIEW_LEN: usize = 8;

/// Get the user's home directory
///
/// Prefers the HOME environment variable over dirs::home_dir() so that
/// containers and tests that override HOME are respected.
pub fn get_home_dir() -> anyhow::Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        return Ok(PathBuf::from(home));
    }

    dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))
}

/// Root directory for registry state (`CAIRN_HOME`, else `~/.cairn`)
pub fn registry_home() -> anyhow::Result<PathBuf> {
    if let Ok(home) = std::env::var("CAIRN_HOME") {
        if !home.trim().is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    Ok(get_home_dir()?.join(".cairn"))
}

/// Make an id safe to use as a file stem
///
/// Characters outside `[A-Za-z0-9._-]` become `_` and the result is capped
/// at 200 characters. Cache and install-record file names depend on this
/// exact rule.
pub fn sanitize_filename(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect()
}

/// Loggable preview of a credential: first 8 characters and an ellipsis
pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(TOKEN_PREVIEW_LEN).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_home_dir_from_env() {
        if std::env::var("HOME").is_ok() {
            let home = get_home_dir().unwrap();
            assert!(!home.as_os_str().is_empty());
        }
    }

    #[test]
    fn test_sanitize_filename_replaces_unsafe_chars() {
        assert_eq!(sanitize_filename("github-a1b2c3d4e5f6"), "github-a1b2c3d4e5f6");
        assert_eq!(sanitize_filename("owner/repo:v1"), "owner_repo_v1");
        assert_eq!(sanitize_filename("a b.c"), "a_b.c");
    }

    #[test]
    fn test_sanitize_filename_truncates() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_filename(&long).len(), 200);
    }

    #[test]
    fn test_token_preview_never_exceeds_eight_chars() {
        assert_eq!(token_preview("ghp_1234567890abcdef"), "ghp_1234...");
        assert_eq!(token_preview("abc"), "abc...");
        assert!(!token_preview("ghp_1234567890abcdef").contains("567890"));
    }
}
