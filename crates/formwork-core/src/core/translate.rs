// formwork-core/src/core/translate.rs
// ============================================================================
// Module: Formwork Translation
// Description: File-backed translation dictionaries with missing-entry capture.
// Purpose: Localize view and API strings per application language.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! Dictionaries live at `{src_dir}/Lang/{lang}.json` as
//! `{context: {source: translation}}`. English is the source language and is
//! never loaded. A lookup that misses records an empty entry so translators
//! can find it; when the dictionary file already exists it is rewritten with
//! the new entry. Only two-letter language codes reach the filesystem.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Source language of all strings.
pub const SOURCE_LANGUAGE: &str = "en";
/// Maximum dictionary file size.
const MAX_DICTIONARY_BYTES: u64 = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Language code errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageError {
    /// Code is not two lowercase ASCII letters.
    #[error("invalid language code: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Two-letter lowercase language code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Language(String);

impl Language {
    /// Parses a language code.
    ///
    /// # Errors
    ///
    /// Returns [`LanguageError::Invalid`] for anything but two ASCII letters.
    pub fn parse(code: &str) -> Result<Self, LanguageError> {
        let lower = code.trim().to_ascii_lowercase();
        if lower.len() == 2 && lower.chars().all(|ch| ch.is_ascii_lowercase()) {
            Ok(Self(lower))
        } else {
            Err(LanguageError::Invalid(code.to_string()))
        }
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Context to source to translation.
type Dictionary = BTreeMap<String, BTreeMap<String, String>>;

/// Cached dictionary with its file state.
#[derive(Debug, Default)]
struct LoadedDictionary {
    /// Entries.
    entries: Dictionary,
    /// True when the backing file existed and parsed at load time.
    writable: bool,
}

// ============================================================================
// SECTION: Translator
// ============================================================================

/// Lazily loading, thread-safe translator.
#[derive(Debug)]
pub struct Translator {
    /// Directory holding `Lang/`.
    src_dir: PathBuf,
    /// Loaded dictionaries by language code.
    cache: Mutex<HashMap<String, LoadedDictionary>>,
}

impl Translator {
    /// Creates a translator rooted at the application source directory.
    #[must_use]
    pub fn new(src_dir: impl Into<PathBuf>) -> Self {
        Self {
            src_dir: src_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Translates `source` in `context` into `language`.
    ///
    /// Variables replace `{{ name }}` placeholders in the result.
    #[must_use]
    pub fn translate(
        &self,
        source: &str,
        context: &str,
        language: Option<&str>,
        vars: &Map<String, Value>,
    ) -> String {
        let translated = match language.map(Language::parse) {
            Some(Ok(language)) if language.as_str() != SOURCE_LANGUAGE => {
                self.lookup(&language, context, source)
            }
            _ => source.to_string(),
        };
        substitute_vars(&translated, vars)
    }

    /// Looks up one entry, recording it when missing.
    fn lookup(&self, language: &Language, context: &str, source: &str) -> String {
        let Ok(mut cache) = self.cache.lock() else {
            return source.to_string();
        };
        let path = self.dictionary_path(language);
        let dictionary =
            cache.entry(language.as_str().to_string()).or_insert_with(|| load_dictionary(&path));
        if let Some(found) = dictionary.entries.get(context).and_then(|ctx| ctx.get(source)) {
            return if found.is_empty() { source.to_string() } else { found.clone() };
        }
        dictionary
            .entries
            .entry(context.to_string())
            .or_default()
            .insert(source.to_string(), String::new());
        if dictionary.writable {
            write_dictionary(&path, &dictionary.entries);
        }
        source.to_string()
    }

    /// Returns the dictionary file path for a language.
    fn dictionary_path(&self, language: &Language) -> PathBuf {
        self.src_dir.join("Lang").join(format!("{}.json", language.as_str()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads a dictionary file.
///
/// Missing, oversized, or malformed files yield an empty dictionary that is
/// never written back, so a broken file keeps its content.
fn load_dictionary(path: &Path) -> LoadedDictionary {
    let Ok(metadata) = fs::metadata(path) else {
        return LoadedDictionary::default();
    };
    if metadata.len() > MAX_DICTIONARY_BYTES {
        return LoadedDictionary::default();
    }
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<Dictionary>(&content).ok())
        .map_or_else(LoadedDictionary::default, |entries| LoadedDictionary {
            entries,
            writable: true,
        })
}

/// Writes the dictionary back; failures leave the file untouched.
fn write_dictionary(path: &Path, entries: &Dictionary) {
    if let Ok(content) = serde_json::to_string_pretty(entries) {
        let tmp = path.with_extension("json.tmp");
        if fs::write(&tmp, content).is_ok() && fs::rename(&tmp, path).is_err() {
            let _removed = fs::remove_file(&tmp);
        }
    }
}

/// Replaces `{{ name }}` placeholders with variable values.
#[must_use]
pub fn substitute_vars(text: &str, vars: &Map<String, Value>) -> String {
    if vars.is_empty() || !text.contains("{{") {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[.. start]);
        let after = &rest[start + 2 ..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start ..]);
            return out;
        };
        let name = after[.. end].trim();
        match vars.get(name) {
            Some(Value::String(value)) => out.push_str(value),
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str(&rest[start .. start + 2 + end + 2]),
        }
        rest = &after[end + 2 ..];
    }
    out.push_str(rest);
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::*;

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn english_passes_through_with_vars() {
        let translator = Translator::new("/nonexistent");
        let out = translator.translate("Hello {{name}}", "ctx", Some("en"), &vars(json!({"name": "Ann"})));
        assert_eq!(out, "Hello Ann");
    }

    #[test]
    fn known_entries_translate_and_missing_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Lang")).unwrap();
        let file = dir.path().join("Lang/sk.json");
        fs::write(&file, r#"{"Desktop": {"Save": "Uložiť"}}"#).unwrap();
        let translator = Translator::new(dir.path());
        let empty = Map::new();
        assert_eq!(translator.translate("Save", "Desktop", Some("sk"), &empty), "Uložiť");
        assert_eq!(translator.translate("Cancel", "Desktop", Some("sk"), &empty), "Cancel");
        let written: Value = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(written["Desktop"]["Cancel"], json!(""));
    }

    #[test]
    fn missing_dictionary_file_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let translator = Translator::new(dir.path());
        assert_eq!(translator.translate("Save", "Desktop", Some("de"), &Map::new()), "Save");
        assert!(!dir.path().join("Lang/de.json").exists());
    }

    #[test]
    fn malformed_dictionary_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Lang")).unwrap();
        let file = dir.path().join("Lang/sk.json");
        let broken = r#"{"Desktop": {"Save": "Uložiť", "Close": "Zavrieť",}}"#;
        fs::write(&file, broken).unwrap();
        let translator = Translator::new(dir.path());
        assert_eq!(translator.translate("Open", "Desktop", Some("sk"), &Map::new()), "Open");
        assert_eq!(translator.translate("Save", "Desktop", Some("sk"), &Map::new()), "Save");
        assert_eq!(fs::read_to_string(&file).unwrap(), broken);
    }

    #[test]
    fn invalid_language_codes_fall_back_to_source() {
        let translator = Translator::new("/nonexistent");
        assert_eq!(translator.translate("Save", "x", Some("../../etc"), &Map::new()), "Save");
        assert!(Language::parse("SK").is_ok());
        assert!(Language::parse("svk").is_err());
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        assert_eq!(substitute_vars("a {{ b }} c", &vars(json!({"x": 1}))), "a {{ b }} c");
        assert_eq!(substitute_vars("n={{ n }}", &vars(json!({"n": 3}))), "n=3");
    }
}
