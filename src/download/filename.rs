//! Filename derivation, sanitization, and destination path resolution.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use url::Url;

/// Replaces characters that are invalid in file names with `_`.
#[must_use]
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            // Also handle null and control characters
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_relative_path(Path::new(&sanitized)) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Filename derived from the URL's last path segment, or `download_<ts>.bin`.
#[must_use]
pub(crate) fn fallback_filename_from_url(url: Option<&Url>) -> String {
    if let Some(url) = url
        && let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last).map_or_else(
            |e| {
                debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
                last.to_string()
            },
            std::borrow::Cow::into_owned,
        );
        return sanitize_filename(&decoded);
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{timestamp}.bin")
}

/// Returns `name`, or the first `stem_N.ext` (N starting at 2) not in `taken`.
///
/// The returned name is inserted into `taken`.
pub(crate) fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    };

    let mut i = 2usize;
    loop {
        let candidate = format!("{stem}_{i}{ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        i += 1;
    }
}

/// Joins a destination identifier onto `root`, refusing identifiers that are
/// absolute or climb out of `root`.
#[must_use]
pub(crate) fn resolve_within(root: &Path, identifier: &str) -> Option<PathBuf> {
    let relative = Path::new(identifier);
    if identifier.trim().is_empty() || !is_safe_relative_path(relative) {
        return None;
    }
    Some(root.join(relative))
}

fn is_safe_relative_path(path: &Path) -> bool {
    !path.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file\\name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file:name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file*name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file?name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("a\u{0}b"), "a_b");
    }

    #[test]
    fn test_sanitize_filename_neutralizes_parent_dir() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename(""), "_");
    }

    #[test]
    fn test_fallback_filename_decodes_segment() {
        let url = Url::parse("https://example.com/dir/my%20file.zip").unwrap();
        assert_eq!(fallback_filename_from_url(Some(&url)), "my file.zip");
    }

    #[test]
    fn test_fallback_filename_without_segment() {
        let url = Url::parse("https://example.com/").unwrap();
        let name = fallback_filename_from_url(Some(&url));
        assert!(name.starts_with("download_"), "got {name}");
        assert!(fallback_filename_from_url(None).ends_with(".bin"));
    }

    #[test]
    fn test_unique_name_appends_suffix_before_extension() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("file.pdf", &mut taken), "file.pdf");
        assert_eq!(unique_name("file.pdf", &mut taken), "file_2.pdf");
        assert_eq!(unique_name("file.pdf", &mut taken), "file_3.pdf");
        assert_eq!(unique_name("README", &mut taken), "README");
        assert_eq!(unique_name("README", &mut taken), "README_2");
        assert_eq!(unique_name(".hidden", &mut taken), ".hidden");
        assert_eq!(unique_name(".hidden", &mut taken), ".hidden_2");
    }

    #[test]
    fn test_resolve_within_accepts_nested_relative_paths() {
        let root = Path::new("/data/out");
        assert_eq!(
            resolve_within(root, "sub/dir/file.bin").unwrap(),
            PathBuf::from("/data/out/sub/dir/file.bin")
        );
        assert_eq!(
            resolve_within(root, "./file.bin").unwrap(),
            PathBuf::from("/data/out/./file.bin")
        );
    }

    #[test]
    fn test_resolve_within_rejects_escapes() {
        let root = Path::new("/data/out");
        assert!(resolve_within(root, "../etc/passwd").is_none());
        assert!(resolve_within(root, "a/../../b").is_none());
        assert!(resolve_within(root, "/etc/passwd").is_none());
        assert!(resolve_within(root, "   ").is_none());
    }
}
