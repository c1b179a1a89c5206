// formwork-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Localized message templates and the `t!` formatting macro.
// Purpose: Keep every user-facing string of the `formwork` binary in one table.
// Dependencies: Standard library
// ============================================================================

//! ## Overview
//! Commands never format user-facing text inline. They name a catalog key and
//! pass named arguments through [`t!`](crate::t); the template comes from the
//! locale chosen at startup by `--lang` or `FORMWORK_LANG`.
//!
//! A key missing from the Slovak table resolves to the English template, and a
//! key missing from both renders as the key itself. Placeholders without a
//! matching argument are left in place.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Locales
// ============================================================================

/// Output languages understood by the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Locale {
    /// English, the fallback for every lookup.
    En,
    /// Slovak.
    Sk,
}

impl Locale {
    /// Returns the short language tag (`en`, `sk`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Sk => "sk",
        }
    }

    /// Parses a language tag such as `sk`, `SK` or `en_US`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let tag = value.trim();
        let language = tag.split(['-', '_']).next().unwrap_or_default();
        SUPPORTED_LOCALES
            .iter()
            .copied()
            .find(|locale| locale.as_str().eq_ignore_ascii_case(language))
    }
}

/// Every locale with a catalog, English first.
pub const SUPPORTED_LOCALES: &[Locale] = &[Locale::En, Locale::Sk];

/// Locale picked once at startup.
static ACTIVE_LOCALE: OnceLock<Locale> = OnceLock::new();

/// Fixes the output locale for the rest of the process.
///
/// Later calls are ignored.
pub fn set_locale(locale: Locale) {
    let _ = ACTIVE_LOCALE.set(locale);
}

/// Returns the output locale, English when none was set.
#[must_use]
pub fn current_locale() -> Locale {
    ACTIVE_LOCALE.get().copied().unwrap_or(Locale::En)
}

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// One named value substituted into a template.
#[derive(Clone)]
pub struct MessageArg {
    /// Placeholder name without braces.
    pub key: &'static str,
    /// Rendered value.
    pub value: String,
}

impl MessageArg {
    /// Pairs a placeholder name with its rendered value.
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// English catalog entries.
const CATALOG_EN: &[(&str, &str)] = &[
    ("main.version", "formwork {version}"),
    ("output.stream.stdout", "stdout"),
    ("output.stream.stderr", "stderr"),
    ("output.stream.unknown", "output"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("config.load_failed", "Failed to load config: {error}"),
    ("config.validate.ok", "Config valid."),
    ("app.init_failed", "Failed to initialize application: {error}"),
    ("serve.init_failed", "Failed to initialize HTTP server: {error}"),
    ("serve.listening", "Serving {app} on http://{bind}"),
    ("serve.failed", "HTTP server failed: {error}"),
    ("install.failed", "Failed to install models: {error}"),
    ("install.table", "Installed {model} into table {table}"),
    ("install.ok", "Installed {count} models."),
    ("render.params_invalid", "Request parameters must be a JSON object: {error}"),
    ("render.redirect", "Redirect to {location}"),
    ("render.status_failed", "Request failed with status {status}."),
    ("settings.value_invalid", "Setting value must be JSON: {error}"),
    ("settings.value_missing", "A value is required to set {path}."),
    ("settings.get.not_found", "No setting stored at {path}."),
    ("settings.render_failed", "Failed to render setting {path}: {error}"),
    ("settings.save_failed", "Failed to update setting {path}: {error}"),
    ("settings.set.ok", "Saved setting {path}."),
    ("settings.delete.ok", "Deleted setting {path}."),
    ("models.none", "No models registered."),
    ("models.entry", "{name} (table {table}, {columns} columns)"),
    ("build.log_failed", "Failed to prepare build log at {path}: {error}"),
    ("build.failed", "Build failed: {error}"),
    ("build.skipped", "Kept {path} (regenerate tag removed)."),
    ("build.ok", "Application written to {path} ({written} files written, {skipped} kept)."),
    ("build.admin_token", "Administrator token: {token}"),
    ("i18n.lang.invalid_env", "Invalid value for {env}: {value}. Expected 'en' or 'sk'."),
    (
        "i18n.disclaimer.machine_translated",
        "Note: non-English output is machine-translated and may be inaccurate.",
    ),
];

/// Slovak catalog entries.
const CATALOG_SK: &[(&str, &str)] = &[
    ("main.version", "formwork {version}"),
    ("output.stream.stdout", "štandardný výstup"),
    ("output.stream.stderr", "chybový výstup"),
    ("output.stream.unknown", "výstup"),
    ("output.write_failed", "Zápis do {stream} zlyhal: {error}"),
    ("config.load_failed", "Konfiguráciu sa nepodarilo načítať: {error}"),
    ("config.validate.ok", "Konfigurácia je platná."),
    ("app.init_failed", "Aplikáciu sa nepodarilo inicializovať: {error}"),
    ("serve.init_failed", "HTTP server sa nepodarilo inicializovať: {error}"),
    ("serve.listening", "Aplikácia {app} beží na http://{bind}"),
    ("serve.failed", "HTTP server zlyhal: {error}"),
    ("install.failed", "Modely sa nepodarilo nainštalovať: {error}"),
    ("install.table", "Model {model} nainštalovaný do tabuľky {table}"),
    ("install.ok", "Nainštalovaných modelov: {count}."),
    ("render.params_invalid", "Parametre požiadavky musia byť JSON objekt: {error}"),
    ("render.redirect", "Presmerovanie na {location}"),
    ("render.status_failed", "Požiadavka zlyhala so stavom {status}."),
    ("settings.value_invalid", "Hodnota nastavenia musí byť JSON: {error}"),
    ("settings.value_missing", "Na nastavenie {path} je potrebná hodnota."),
    ("settings.get.not_found", "Na ceste {path} nie je uložené žiadne nastavenie."),
    ("settings.render_failed", "Nastavenie {path} sa nepodarilo vypísať: {error}"),
    ("settings.save_failed", "Nastavenie {path} sa nepodarilo zmeniť: {error}"),
    ("settings.set.ok", "Nastavenie {path} uložené."),
    ("settings.delete.ok", "Nastavenie {path} vymazané."),
    ("models.none", "Nie sú registrované žiadne modely."),
    ("models.entry", "{name} (tabuľka {table}, stĺpcov: {columns})"),
    ("build.log_failed", "Log zostavenia {path} sa nepodarilo pripraviť: {error}"),
    ("build.failed", "Zostavenie zlyhalo: {error}"),
    ("build.skipped", "Súbor {path} ponechaný (značka regenerovania odstránená)."),
    (
        "build.ok",
        "Aplikácia zapísaná do {path} (zapísaných súborov: {written}, ponechaných: \
         {skipped}).",
    ),
    ("build.admin_token", "Token administrátora: {token}"),
    ("i18n.lang.invalid_env", "Neplatná hodnota {env}: {value}. Očakáva sa 'en' alebo 'sk'."),
    (
        "i18n.disclaimer.machine_translated",
        "Poznámka: neanglický výstup je strojovo preložený a môže byť nepresný.",
    ),
];

/// Returns the catalog rows of `locale` in declaration order.
#[must_use]
pub fn catalog_entries_for(locale: Locale) -> &'static [(&'static str, &'static str)] {
    match locale {
        Locale::En => CATALOG_EN,
        Locale::Sk => CATALOG_SK,
    }
}

/// Returns the indexed catalog of `locale`.
pub(crate) fn catalog_for(locale: Locale) -> &'static HashMap<&'static str, &'static str> {
    static INDEXES: OnceLock<HashMap<Locale, HashMap<&'static str, &'static str>>> =
        OnceLock::new();
    static EMPTY: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    let indexes = INDEXES.get_or_init(|| {
        SUPPORTED_LOCALES
            .iter()
            .map(|locale| (*locale, catalog_entries_for(*locale).iter().copied().collect()))
            .collect()
    });
    indexes.get(&locale).unwrap_or_else(|| EMPTY.get_or_init(HashMap::new))
}

/// Finds the template for `key`, falling back to English.
fn template_for(key: &str) -> Option<&'static str> {
    let locale = current_locale();
    catalog_for(locale)
        .get(key)
        .or_else(|| catalog_for(Locale::En).get(key))
        .copied()
}

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Renders the template for `key` with `args` in the active locale.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let Some(template) = template_for(key) else {
        return key.to_string();
    };
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        output.push_str(&rest[.. open]);
        let tail = &rest[open ..];
        let Some(close) = tail.find('}') else {
            output.push_str(tail);
            return output;
        };
        let name = &tail[1 .. close];
        match args.iter().find(|arg| arg.key == name) {
            Some(arg) => output.push_str(&arg.value),
            None => output.push_str(&tail[..= close]),
        }
        rest = &tail[close + 1 ..];
    }
    output.push_str(rest);
    output
}

/// Formats a catalog message: `t!("install.ok", count = 3)`.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {
        $crate::i18n::translate(
            $key,
            ::std::vec![$($crate::i18n::MessageArg::new(stringify!($name), $value.to_string())),*],
        )
    };
}
