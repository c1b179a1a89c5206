// formwork-cli/src/tests/i18n.rs
// ============================================================================
// Module: CLI Message Catalog Tests
// Description: Checks the English and Slovak tables against each other.
// Purpose: Catch keys or placeholders added to one locale only.
// Dependencies: formwork-cli i18n module
// ============================================================================

//! ## Overview
//! Every key exists once per locale with the same placeholders, tags parse
//! leniently, and formatting substitutes named arguments.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

use std::collections::BTreeSet;

use crate::i18n::Locale;
use crate::i18n::MessageArg;
use crate::i18n::SUPPORTED_LOCALES;
use crate::i18n::catalog_entries_for;
use crate::i18n::catalog_for;
use crate::i18n::translate;

/// Collects `{name}` placeholders of a template.
fn placeholder_names(template: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1 ..];
        let Some(end) = after.find('}') else {
            panic!("unclosed placeholder in {template}");
        };
        let name = &after[.. end];
        assert!(
            !name.is_empty() && name.chars().all(|ch| ch.is_ascii_lowercase() || ch == '_'),
            "invalid placeholder '{name}' in {template}"
        );
        names.insert(name.to_string());
        rest = &after[end + 1 ..];
    }
    names
}

#[test]
fn every_locale_defines_the_english_keys_once() {
    let en_keys: BTreeSet<&'static str> = catalog_for(Locale::En).keys().copied().collect();
    for locale in SUPPORTED_LOCALES {
        let locale_keys: BTreeSet<&'static str> = catalog_for(*locale).keys().copied().collect();
        assert_eq!(en_keys, locale_keys, "locale catalogs must stay in parity ({locale:?})");
        assert_eq!(
            catalog_entries_for(*locale).len(),
            locale_keys.len(),
            "duplicate keys in {locale:?}"
        );
    }
}

#[test]
fn catalogs_have_placeholder_parity_with_english() {
    for (key, en_template) in catalog_entries_for(Locale::En) {
        let expected = placeholder_names(en_template);
        for locale in SUPPORTED_LOCALES {
            let template = catalog_for(*locale).get(key).copied().expect("key exists");
            assert_eq!(
                expected,
                placeholder_names(template),
                "placeholder mismatch for '{key}' in {locale:?}"
            );
        }
    }
}

#[test]
fn non_english_locales_differ_for_curated_keys() {
    const CURATED_KEYS: &[&str] = &["config.validate.ok", "i18n.disclaimer.machine_translated"];
    for key in CURATED_KEYS {
        let en = catalog_for(Locale::En).get(key).copied().expect("en key exists");
        let sk = catalog_for(Locale::Sk).get(key).copied().expect("sk key exists");
        assert_ne!(en, sk, "Slovak must differ from English for '{key}'");
    }
}

#[test]
fn locale_parse_accepts_region_tags_and_case() {
    assert_eq!(Locale::parse("en"), Some(Locale::En));
    assert_eq!(Locale::parse("EN-us"), Some(Locale::En));
    assert_eq!(Locale::parse("sk_SK"), Some(Locale::Sk));
    assert_eq!(Locale::parse(" SK "), Some(Locale::Sk));
    assert_eq!(Locale::parse(""), None);
    assert_eq!(Locale::parse("de"), None);
    assert_eq!(Locale::Sk.as_str(), "sk");
}

#[test]
fn translate_substitutes_placeholders_and_falls_back_to_key() {
    let output = translate(
        "install.table",
        vec![MessageArg::new("model", "Crm/Customer"), MessageArg::new("table", "crm_customer")],
    );
    assert_eq!(output, "Installed Crm/Customer into table crm_customer");
    assert_eq!(translate("missing.key", Vec::new()), "missing.key");
}

#[test]
fn translate_keeps_placeholders_without_arguments() {
    let output = translate("install.table", vec![MessageArg::new("model", "Crm/Customer")]);
    assert_eq!(output, "Installed Crm/Customer into table {table}");
}
