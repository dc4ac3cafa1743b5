use std::path::PathBuf;
use uuid::Uuid;

const MAX_SAFE_NAME_LEN: usize = 128;

/// File extensions `FileService` will accept for download/save, matching
/// the source system's chunkable-document set. Checked case-insensitively,
/// dot included.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".odt", ".rtf", ".txt", ".md", ".markdown", ".html", ".htm", ".xml",
    ".csv", ".tsv", ".json", ".yaml", ".yml", ".ppt", ".pptx", ".xls", ".xlsx", ".py", ".js",
    ".ts", ".rs", ".go", ".java", ".c", ".cpp", ".h", ".rb", ".php", ".sh",
];

/// Extracts the extension (lowercased, dot included) from a filename, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let dot = name.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(name[dot..].to_lowercase())
}

/// Validates `name`'s extension is in [`SUPPORTED_EXTENSIONS`], returning
/// the skip reason string for [`crate::error::FileError::Skipped`] when not.
pub fn validate_extension(name: &str) -> Result<(), String> {
    match extension_of(name) {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(format!("unsupported file extension: {ext}")),
        None => Err(format!("file name {name:?} has no extension")),
    }
}

/// Extracts a filename from a `Content-Disposition` header value, handling
/// both `filename="quoted value"` and bare `filename=value` forms. Returns
/// `None` if neither form is present.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        let Some(rest) = part.strip_prefix("filename*=").or_else(|| part.strip_prefix("filename=")) else {
            continue;
        };
        let rest = rest.trim().trim_matches('"');
        // `filename*=UTF-8''encoded%20name.pdf` carries a charset/lang prefix
        // before the final `''`; strip it if present.
        let rest = rest.rsplit("''").next().unwrap_or(rest);
        if rest.is_empty() {
            continue;
        }
        return Some(rest.to_string());
    }
    None
}

/// Filters a source-provided filename down to `[A-Za-z0-9._- ]`, truncated
/// to [`MAX_SAFE_NAME_LEN`] characters, so it is always safe to use as a
/// path component regardless of what the source sent (path separators,
/// control characters, leading dots...).
pub fn safe_name(name: &str) -> String {
    let filtered: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect();
    let filtered = filtered.trim();
    if filtered.is_empty() {
        return "unnamed".to_string();
    }
    filtered.chars().take(MAX_SAFE_NAME_LEN).collect()
}

/// Base directory for one sync job's downloaded files: `{tmp}/sync/{sync_job_id}`.
pub fn sync_job_dir(tmp_root: &std::path::Path, sync_job_id: Uuid) -> PathBuf {
    tmp_root.join("sync").join(sync_job_id.to_string())
}

/// Per-file temp path within a job's directory: `{base}/{uuid}-{safe(name)}`.
pub fn temp_file_path(base: &std::path::Path, name: &str) -> PathBuf {
    base.join(format!("{}-{}", Uuid::new_v4(), safe_name(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_name_strips_path_separators() {
        assert_eq!(safe_name("../../etc/passwd"), "....etcpasswd");
    }

    #[test]
    fn safe_name_keeps_allowed_punctuation() {
        assert_eq!(safe_name("Quarterly Report v2.pdf"), "Quarterly Report v2.pdf");
    }

    #[test]
    fn safe_name_truncates_long_names() {
        let long = "a".repeat(500);
        assert_eq!(safe_name(&long).len(), MAX_SAFE_NAME_LEN);
    }

    #[test]
    fn safe_name_falls_back_when_nothing_survives() {
        assert_eq!(safe_name("///???"), "unnamed");
    }

    #[test]
    fn temp_file_path_embeds_safe_name() {
        let base = std::path::Path::new("/tmp/sync/job-1");
        let path = temp_file_path(base, "report.pdf");
        assert!(path.to_string_lossy().ends_with("-report.pdf"));
    }

    #[test]
    fn validate_extension_accepts_supported_extension_case_insensitively() {
        assert!(validate_extension("Report.PDF").is_ok());
    }

    #[test]
    fn validate_extension_rejects_unsupported_extension() {
        assert!(validate_extension("archive.zip").is_err());
    }

    #[test]
    fn validate_extension_rejects_missing_extension() {
        assert!(validate_extension("README").is_err());
    }

    #[test]
    fn filename_from_content_disposition_handles_quoted_form() {
        let value = r#"attachment; filename="file.pdf""#;
        assert_eq!(filename_from_content_disposition(value).as_deref(), Some("file.pdf"));
    }

    #[test]
    fn filename_from_content_disposition_handles_extended_form() {
        let value = "attachment; filename*=UTF-8''file%20name.pdf";
        assert_eq!(filename_from_content_disposition(value).as_deref(), Some("file%20name.pdf"));
    }

    #[test]
    fn filename_from_content_disposition_returns_none_without_filename() {
        assert_eq!(filename_from_content_disposition("attachment"), None);
    }
}
