// formwork-server/src/assets.rs
// ============================================================================
// Module: Static Assets
// Description: Resolution and content typing of files under the Assets dir.
// Purpose: Serve application stylesheets, scripts, and images safely.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Asset paths resolve below `{src_dir}/Assets`. Paths with parent, root,
//! or prefix components never resolve, so a request cannot leave the
//! asset directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Asset directory name below the source directory.
pub const ASSETS_DIR: &str = "Assets";

/// Content types by lowercase file extension.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("css", "text/css; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
    ("json", "application/json"),
    ("html", "text/html; charset=utf-8"),
    ("txt", "text/plain; charset=utf-8"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
];

/// Fallback content type.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves a request path to a file path below the asset directory.
#[must_use]
pub fn resolve_asset(src_dir: &Path, request_path: &str) -> Option<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.contains('\\') {
        return None;
    }
    let relative = Path::new(trimmed);
    if !relative.components().all(|component| matches!(component, Component::Normal(_))) {
        return None;
    }
    Some(src_dir.join(ASSETS_DIR).join(relative))
}

/// Returns the content type of a file path.
#[must_use]
pub fn content_type(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return DEFAULT_CONTENT_TYPE;
    };
    let extension = extension.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == extension)
        .map_or(DEFAULT_CONTENT_TYPE, |(_, content_type)| *content_type)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
