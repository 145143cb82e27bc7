//! Local pre-upload decisions: compression threshold, skip filters and
//! remote folder normalisation. Pure functions, no I/O.

/// True iff a file of this size must be split into compressed volumes
/// before upload. Total; never fails.
pub fn needs_compression(file_size_bytes: u64, threshold_bytes: u64) -> bool {
    file_size_bytes > threshold_bytes
}

/// Substrings that mark OS droppings and editor temp files.
const SKIP_PATTERNS: &[&str] = &[
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    "Desktop.ini",
    ".tmp",
    "~$",
    ".swp",
    ".swo",
    "__pycache__",
];

/// True if the file should never be uploaded (dotfiles and temp files).
pub fn should_skip(file_name: &str) -> bool {
    if file_name.starts_with('.') {
        return true;
    }
    SKIP_PATTERNS.iter().any(|p| file_name.contains(p))
}

/// Prefixes the configured default folder unless the argument already carries
/// it. An empty argument resolves to the default folder itself.
pub fn normalize_folder(folder: &str, default_folder: &str) -> String {
    let folder = folder.trim_matches('/');
    if default_folder.is_empty() {
        return folder.to_string();
    }
    if folder.is_empty() {
        return default_folder.to_string();
    }
    if folder == default_folder || folder.starts_with(&format!("{default_folder}/")) {
        return folder.to_string();
    }
    format!("{default_folder}/{folder}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_at_or_under_threshold_are_not_compressed() {
        assert!(!needs_compression(0, 8));
        assert!(!needs_compression(7, 8));
        assert!(!needs_compression(8, 8));
    }

    #[test]
    fn files_over_threshold_are_compressed() {
        assert!(needs_compression(9, 8));
        assert!(needs_compression(u64::MAX, 8));
    }

    #[test]
    fn hidden_and_temp_files_are_skipped() {
        assert!(should_skip(".DS_Store"));
        assert!(should_skip(".gitignore"));
        assert!(should_skip("Thumbs.db"));
        assert!(should_skip("~$report.docx"));
        assert!(should_skip("notes.txt.swp"));
    }

    #[test]
    fn regular_files_are_not_skipped() {
        assert!(!should_skip("video.mp4"));
        assert!(!should_skip("archive.7z.001"));
        assert!(!should_skip("report v2.pdf"));
    }

    #[test]
    fn default_folder_is_prefixed_once() {
        assert_eq!(normalize_folder("photos", "melted"), "melted/photos");
        assert_eq!(normalize_folder("melted/photos", "melted"), "melted/photos");
        assert_eq!(normalize_folder("melted", "melted"), "melted");
        assert_eq!(normalize_folder("", "melted"), "melted");
    }

    #[test]
    fn empty_default_folder_leaves_argument_untouched() {
        assert_eq!(normalize_folder("photos", ""), "photos");
        assert_eq!(normalize_folder("/photos/", ""), "photos");
    }
}
