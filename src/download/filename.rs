//! Filename sanitization and collision-free path resolution for downloads.

use std::path::{Path, PathBuf};

use url::Url;

/// Removes characters that are invalid on common filesystems:
/// `/ \ : * ? " < > |`. All other characters pass through unchanged.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Resolves a collision-free variant of `path`.
///
/// If `path` does not exist it is returned unchanged. Otherwise the name is
/// split into stem and suffix and `stem (0)suffix`, `stem (1)suffix`, ... are
/// probed in increasing order; the first non-existing candidate wins.
///
/// The check and the later file creation are not atomic: a concurrent writer
/// can claim the returned path in between. Single-threaded callers are safe;
/// the race is accepted as a known limitation.
#[must_use]
pub fn uniquify(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Split on the last dot so "v1.2.cbz" probes as "v1.2 (0).cbz".
    let (stem, suffix) = match name.rfind('.') {
        Some(at) if at > 0 => (&name[..at], &name[at..]),
        _ => (name.as_str(), ""),
    };

    let mut n = 0u64;
    loop {
        let candidate = dir.join(format!("{stem} ({n}){suffix}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Derives the destination filename from a download URL: the trailing path
/// segment, percent-decoded, then sanitized.
///
/// Falls back to a timestamp-based name when the URL has no usable trailing
/// segment or sanitization leaves nothing behind.
#[must_use]
pub(crate) fn destination_name(url: &Url) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last)
            .map(std::borrow::Cow::into_owned)
            .unwrap_or_else(|_| last.to_string());
        let name = sanitize_filename(&decoded);
        // Reject names that would resolve outside the download directory.
        if !name.is_empty() && name != "." && name != ".." {
            return name;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{timestamp}.bin")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_removes_each_illegal_char() {
        for (input, expected) in [
            ("a/b.cbz", "ab.cbz"),
            ("a\\b.cbz", "ab.cbz"),
            ("a:b.cbz", "ab.cbz"),
            ("a*b.cbz", "ab.cbz"),
            ("a?b.cbz", "ab.cbz"),
            ("a\"b.cbz", "ab.cbz"),
            ("a<b>.cbz", "ab.cbz"),
            ("a|b.cbz", "ab.cbz"),
        ] {
            assert_eq!(sanitize_filename(input), expected, "input: {input}");
        }
    }

    #[test]
    fn test_sanitize_preserves_everything_else() {
        assert_eq!(
            sanitize_filename("Saga Vol. 1 (2012) [digital].cbz"),
            "Saga Vol. 1 (2012) [digital].cbz"
        );
        assert_eq!(sanitize_filename("日本語.cbz"), "日本語.cbz");
    }

    #[test]
    fn test_sanitize_empty_input() {
        assert_eq!(sanitize_filename(""), "");
        assert_eq!(sanitize_filename("/\\:*?\"<>|"), "");
    }

    #[test]
    fn test_uniquify_free_path_is_identity() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("issue.cbz");
        assert_eq!(uniquify(&path), path);
    }

    #[test]
    fn test_uniquify_takes_first_numbered_slot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("issue.cbz");
        std::fs::write(&path, b"existing").unwrap();

        assert_eq!(uniquify(&path), temp_dir.path().join("issue (0).cbz"));
    }

    #[test]
    fn test_uniquify_skips_taken_slots() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("issue.cbz");
        std::fs::write(&path, b"0").unwrap();
        std::fs::write(temp_dir.path().join("issue (0).cbz"), b"1").unwrap();
        std::fs::write(temp_dir.path().join("issue (1).cbz"), b"2").unwrap();

        assert_eq!(uniquify(&path), temp_dir.path().join("issue (2).cbz"));
    }

    #[test]
    fn test_uniquify_never_returns_existing_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("issue.cbz");
        std::fs::write(&path, b"x").unwrap();

        for _ in 0..5 {
            let next = uniquify(&path);
            assert!(!next.exists());
            std::fs::write(&next, b"x").unwrap();
        }
    }

    #[test]
    fn test_uniquify_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("README");
        std::fs::write(&path, b"x").unwrap();

        assert_eq!(uniquify(&path), temp_dir.path().join("README (0)"));
    }

    #[test]
    fn test_uniquify_dotfile_keeps_leading_dot_intact() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".hidden");
        std::fs::write(&path, b"x").unwrap();

        // Leading dot is not an extension separator.
        assert_eq!(uniquify(&path), temp_dir.path().join(".hidden (0)"));
    }

    #[test]
    fn test_destination_name_decodes_trailing_segment() {
        let url = Url::parse("https://example.com/dl/Saga%20Vol.%201.cbz").unwrap();
        assert_eq!(destination_name(&url), "Saga Vol. 1.cbz");
    }

    #[test]
    fn test_destination_name_sanitizes_decoded_segment() {
        let url = Url::parse("https://example.com/dl/a%3Ab%2Fc.cbz").unwrap();
        assert_eq!(destination_name(&url), "abc.cbz");
    }

    #[test]
    fn test_destination_name_empty_path_falls_back() {
        let url = Url::parse("https://example.com/").unwrap();
        let name = destination_name(&url);
        assert!(name.starts_with("download_"));
        assert!(name.ends_with(".bin"));
    }

    #[test]
    fn test_destination_name_dot_segment_falls_back() {
        let url = Url::parse("https://example.com/%2E%2E").unwrap();
        let name = destination_name(&url);
        assert!(name.starts_with("download_"), "got: {name}");
    }
}
