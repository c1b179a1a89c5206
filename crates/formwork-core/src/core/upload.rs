// formwork-core/src/core/upload.rs
// ============================================================================
// Module: Formwork Uploads
// Description: File storage for image and file columns.
// Purpose: Decode uploaded payloads and place them safely under the upload dir.
// Dependencies: base64, rand, thiserror, time
// ============================================================================

//! ## Overview
//! Image and file columns accept `{fileName, fileData}` objects where
//! `fileData` is a base64 data URL. The payload is written below the
//! configured upload directory and the column stores the relative path.
//! Executable and markup extensions are refused, folder paths may not climb
//! out of the upload directory, and name collisions get a ` (n)` suffix.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Extensions that can never be uploaded.
pub const FORBIDDEN_EXTENSIONS: &[&str] = &["php", "sh", "exe", "bat", "htm", "html", "htaccess"];
/// Extensions accepted by image columns.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "gif", "png", "webp"];
/// Maximum decoded upload size.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
/// Upper bound on collision suffixes tried before giving up.
const MAX_VERSION_SUFFIX: u32 = 10_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Upload errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// Upload directory is not configured.
    #[error("upload folder is not configured")]
    NotConfigured,
    /// Upload directory does not exist.
    #[error("upload folder does not exist")]
    DirMissing,
    /// File type may not be uploaded.
    #[error("this file type cannot be uploaded: {0}")]
    ForbiddenExtension(String),
    /// Folder path is invalid.
    #[error("invalid upload folder path: {0}")]
    InvalidFolder(String),
    /// Payload is not valid base64.
    #[error("invalid upload data: {0}")]
    InvalidData(String),
    /// Filesystem failure.
    #[error("upload io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Upload request extracted from a column value.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// Original file name.
    pub file_name: &'a str,
    /// Base64 data URL or bare base64 payload.
    pub file_data: &'a str,
    /// Subfolder below the upload directory.
    pub folder_path: &'a str,
    /// Optional rename pattern.
    pub rename_pattern: Option<&'a str>,
    /// Restrict to image extensions.
    pub images_only: bool,
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Stores an upload below `upload_dir` and returns the relative stored path.
///
/// # Errors
///
/// Returns [`UploadError`] when the request is refused or the write fails.
pub fn store_upload(
    upload_dir: Option<&Path>,
    request: &UploadRequest<'_>,
    now: OffsetDateTime,
) -> Result<String, UploadError> {
    let upload_dir = upload_dir.ok_or(UploadError::NotConfigured)?;
    if !upload_dir.is_dir() {
        return Err(UploadError::DirMissing);
    }
    let (stem, extension) = split_file_name(request.file_name);
    let lowered = extension.to_ascii_lowercase();
    if FORBIDDEN_EXTENSIONS.contains(&lowered.as_str()) {
        return Err(UploadError::ForbiddenExtension(lowered));
    }
    if request.images_only && !IMAGE_EXTENSIONS.contains(&lowered.as_str()) {
        return Err(UploadError::ForbiddenExtension(lowered));
    }
    let folder = request.folder_path.trim().trim_matches('/');
    if folder.contains("..") || folder.contains('\\') {
        return Err(UploadError::InvalidFolder(folder.to_string()));
    }
    let bytes = decode_file_data(request.file_data)?;

    let file_name = match request.rename_pattern {
        Some(pattern) if !pattern.trim().is_empty() => {
            let random = rand::thread_rng().gen_range(1000 .. 10_000);
            render_rename_pattern(pattern, request.file_name, now, random)
        }
        _ => join_extension(&str2url(stem), extension),
    };
    if file_name.contains('/') || file_name.contains("..") {
        return Err(UploadError::InvalidFolder(file_name));
    }

    let target_dir = if folder.is_empty() { upload_dir.to_path_buf() } else { upload_dir.join(folder) };
    std::fs::create_dir_all(&target_dir).map_err(|err| UploadError::Io(err.to_string()))?;
    let file_name = unique_file_name(&target_dir, &file_name)?;
    std::fs::write(target_dir.join(&file_name), bytes).map_err(|err| UploadError::Io(err.to_string()))?;

    if folder.is_empty() { Ok(file_name) } else { Ok(format!("{folder}/{file_name}")) }
}

/// Decodes a data URL (`data:<mime>;base64,<payload>`) or a bare base64 payload.
///
/// # Errors
///
/// Returns [`UploadError::InvalidData`] when the payload is not valid base64
/// or exceeds [`MAX_UPLOAD_BYTES`].
pub fn decode_file_data(data: &str) -> Result<Vec<u8>, UploadError> {
    let payload = if data.starts_with("data:") {
        data.split_once(',').map_or("", |(_, payload)| payload)
    } else {
        data
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|err| UploadError::InvalidData(err.to_string()))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(UploadError::InvalidData(format!(
            "payload exceeds {MAX_UPLOAD_BYTES} bytes"
        )));
    }
    Ok(bytes)
}

/// Expands rename pattern tokens for an uploaded file name.
#[must_use]
pub fn render_rename_pattern(
    pattern: &str,
    original_name: &str,
    now: OffsetDateTime,
    random: u32,
) -> String {
    let (stem, extension) = split_file_name(original_name);
    pattern
        .replace("{%Y%}", &format!("{:04}", now.year()))
        .replace("{%M%}", &format!("{:02}", u8::from(now.month())))
        .replace("{%D%}", &format!("{:02}", now.day()))
        .replace("{%H%}", &format!("{:02}", now.hour()))
        .replace("{%I%}", &format!("{:02}", now.minute()))
        .replace("{%S%}", &format!("{:02}", now.second()))
        .replace("{%TS%}", &now.unix_timestamp().to_string())
        .replace("{%RAND%}", &random.to_string())
        .replace("{%BASENAME_ASCII%}", &str2url(original_name))
        .replace("{%BASENAME%}", original_name)
        .replace("{%FILENAME_ASCII%}", &str2url(stem))
        .replace("{%FILENAME%}", stem)
        .replace("{%EXT%}", extension)
}

/// Returns a file name that does not collide with existing files in `dir`.
fn unique_file_name(dir: &Path, file_name: &str) -> Result<String, UploadError> {
    if !dir.join(file_name).exists() {
        return Ok(file_name.to_string());
    }
    let (stem, extension) = split_file_name(file_name);
    for version in 1 ..= MAX_VERSION_SUFFIX {
        let candidate = join_extension(&format!("{stem} ({version})"), extension);
        let path: PathBuf = dir.join(&candidate);
        if !path.exists() {
            return Ok(candidate);
        }
    }
    Err(UploadError::Io(format!("too many versions of {file_name}")))
}

// ============================================================================
// SECTION: Names
// ============================================================================

/// Converts text to a lowercase ASCII slug (`Žltý Kôň.jpg` becomes `zlty-kon-jpg`).
#[must_use]
pub fn str2url(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        let folded = fold_char(ch);
        let mut wrote = false;
        for out in folded.chars() {
            let lower = out.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(lower);
                wrote = true;
            }
        }
        if !wrote {
            pending_dash = true;
        }
    }
    slug
}

/// Folds common Latin diacritics to ASCII.
fn fold_char(ch: char) -> String {
    let folded = match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ą' | 'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' | 'Ą' => "a",
        'č' | 'ć' | 'ç' | 'Č' | 'Ć' | 'Ç' => "c",
        'ď' | 'Ď' => "d",
        'é' | 'è' | 'ê' | 'ë' | 'ě' | 'ę' | 'É' | 'È' | 'Ê' | 'Ë' | 'Ě' | 'Ę' => "e",
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => "i",
        'ĺ' | 'ľ' | 'ł' | 'Ĺ' | 'Ľ' | 'Ł' => "l",
        'ň' | 'ń' | 'ñ' | 'Ň' | 'Ń' | 'Ñ' => "n",
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ő' | 'ø' | 'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' | 'Ő' | 'Ø' => "o",
        'ŕ' | 'ř' | 'Ŕ' | 'Ř' => "r",
        'š' | 'ś' | 'Š' | 'Ś' => "s",
        'ß' => "ss",
        'ť' | 'Ť' => "t",
        'ú' | 'ù' | 'û' | 'ü' | 'ů' | 'ű' | 'Ú' | 'Ù' | 'Û' | 'Ü' | 'Ů' | 'Ű' => "u",
        'ý' | 'ÿ' | 'Ý' => "y",
        'ž' | 'ź' | 'ż' | 'Ž' | 'Ź' | 'Ż' => "z",
        other => return other.to_string(),
    };
    folded.to_string()
}

/// Splits a file name into stem and extension (without the dot).
fn split_file_name(file_name: &str) -> (&str, &str) {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match base.rfind('.') {
        Some(index) if index > 0 => (&base[.. index], &base[index + 1 ..]),
        _ => (base, ""),
    }
}

/// Joins a stem and an optional extension.
fn join_extension(stem: &str, extension: &str) -> String {
    if extension.is_empty() { stem.to_string() } else { format!("{stem}.{extension}") }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use proptest::prelude::*;
    use tempfile::TempDir;
    use time::macros::datetime;

    use super::*;

    fn request<'a>(name: &'a str, data: &'a str) -> UploadRequest<'a> {
        UploadRequest {
            file_name: name,
            file_data: data,
            folder_path: "",
            rename_pattern: None,
            images_only: false,
        }
    }

    #[test]
    fn str2url_folds_diacritics() {
        assert_eq!(str2url("Žltý Kôň"), "zlty-kon");
        assert_eq!(str2url("  Hello,  World! "), "hello-world");
        assert_eq!(str2url("---"), "");
    }

    #[test]
    fn stores_upload_with_slug_name() {
        let dir = TempDir::new().unwrap();
        let stored = store_upload(
            Some(dir.path()),
            &request("My Photo.PNG", "data:image/png;base64,aGVsbG8="),
            OffsetDateTime::UNIX_EPOCH,
        )
        .unwrap();
        assert_eq!(stored, "my-photo.PNG");
        assert_eq!(std::fs::read(dir.path().join(&stored)).unwrap(), b"hello");
    }

    #[test]
    fn collisions_get_version_suffix() {
        let dir = TempDir::new().unwrap();
        let mut upload = request("a.txt", "aGVsbG8=");
        upload.folder_path = "docs";
        let first = store_upload(Some(dir.path()), &upload, OffsetDateTime::UNIX_EPOCH).unwrap();
        let second = store_upload(Some(dir.path()), &upload, OffsetDateTime::UNIX_EPOCH).unwrap();
        let third = store_upload(Some(dir.path()), &upload, OffsetDateTime::UNIX_EPOCH).unwrap();
        assert_eq!(first, "docs/a.txt");
        assert_eq!(second, "docs/a (1).txt");
        assert_eq!(third, "docs/a (2).txt");
    }

    #[test]
    fn refuses_forbidden_extensions_and_traversal() {
        let dir = TempDir::new().unwrap();
        let result = store_upload(
            Some(dir.path()),
            &request("shell.PHP", "aGVsbG8="),
            OffsetDateTime::UNIX_EPOCH,
        );
        assert_eq!(result, Err(UploadError::ForbiddenExtension("php".to_string())));

        let mut upload = request("a.txt", "aGVsbG8=");
        upload.folder_path = "../escape";
        let result = store_upload(Some(dir.path()), &upload, OffsetDateTime::UNIX_EPOCH);
        assert!(matches!(result, Err(UploadError::InvalidFolder(_))));
    }

    #[test]
    fn requires_existing_upload_dir() {
        let upload = request("a.txt", "aGVsbG8=");
        assert_eq!(
            store_upload(None, &upload, OffsetDateTime::UNIX_EPOCH),
            Err(UploadError::NotConfigured)
        );
        let missing = Path::new("/nonexistent/formwork-upload-dir");
        assert_eq!(
            store_upload(Some(missing), &upload, OffsetDateTime::UNIX_EPOCH),
            Err(UploadError::DirMissing)
        );
    }

    #[test]
    fn rename_pattern_expands_tokens() {
        let now = datetime!(2024-03-05 07:08:09 UTC);
        let name = render_rename_pattern(
            "{%Y%}{%M%}{%D%}-{%H%}{%I%}{%S%}-{%FILENAME_ASCII%}-{%RAND%}.{%EXT%}",
            "Výkres A.pdf",
            now,
            4321,
        );
        assert_eq!(name, "20240305-070809-vykres-a-4321.pdf");
    }

    proptest! {
        #[test]
        fn str2url_output_is_slug(input in ".{0,40}") {
            let slug = str2url(&input);
            prop_assert!(slug.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }
    }
}
