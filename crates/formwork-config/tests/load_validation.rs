// formwork-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards and section validation.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

//! Config load validation tests for formwork-config.

use std::io::Write;
use std::path::Path;

use formwork_config::ConfigError;
use formwork_config::FormworkConfig;
use formwork_config::StoreType;
use tempfile::NamedTempFile;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<FormworkConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn parse(content: &str) -> Result<FormworkConfig, ConfigError> {
    FormworkConfig::from_toml_str(content, Path::new("/srv/app"))
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(FormworkConfig::load(Some(Path::new(&long_path))), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        FormworkConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&vec![b'#'; 1_048_577]).map_err(|err| err.to_string())?;
    assert_invalid(FormworkConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(FormworkConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_resolves_store_path_next_to_config() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("formwork.toml");
    std::fs::write(
        &path,
        "[app]\nsession_salt = \"salt\"\n\n[store]\ntype = \"sqlite\"\npath = \"data/app.sqlite\"\n\n\
         [[auth.users]]\nid = \"1\"\ntoken = \"t-1\"\nroles = [\"administrator\"]\n\n\
         [permissions.roles]\nclerk = [\"Crm/*\"]\n\n[widgets.Crm.Customers]\nenabled = true\n",
    )
    .map_err(|err| err.to_string())?;
    let config = FormworkConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    if config.store.store_type != StoreType::Sqlite {
        return Err("store type not parsed".to_string());
    }
    let sqlite = config.store.sqlite().ok_or("missing sqlite config")?;
    if sqlite.path != dir.path().join("data/app.sqlite") {
        return Err(format!("unexpected store path {}", sqlite.path.display()));
    }
    let users = config.auth.token_users();
    if users.len() != 1 || users[0].1.login != "1" || !users[0].1.is_administrator() {
        return Err("auth user not mapped".to_string());
    }
    let options = config.application_options();
    if options.widgets["Crm"]["Customers"]["enabled"] != serde_json::json!(true) {
        return Err("widgets tree not carried into options".to_string());
    }
    Ok(())
}

#[test]
fn missing_session_salt_is_rejected() -> TestResult {
    assert_invalid(parse("[app]\nname = \"CRM\"\n"), "app.session_salt is required")
}

#[test]
fn plain_ids_allow_missing_session_salt() -> TestResult {
    parse("[app]\nallow_plain_ids = true\n").map(|_| ()).map_err(|err| err.to_string())
}

#[test]
fn rewrite_base_must_be_slash_delimited() -> TestResult {
    assert_invalid(
        parse("[app]\nsession_salt = \"s\"\nrewrite_base = \"/crm\"\n"),
        "app.rewrite_base must start and end with '/'",
    )
}

#[test]
fn memory_store_rejects_path() -> TestResult {
    assert_invalid(
        parse("[app]\nsession_salt = \"s\"\n[store]\npath = \"x.sqlite\"\n"),
        "memory store must not set path",
    )
}

#[test]
fn sqlite_store_requires_path() -> TestResult {
    assert_invalid(
        parse("[app]\nsession_salt = \"s\"\n[store]\ntype = \"sqlite\"\n"),
        "sqlite store requires path",
    )
}

#[test]
fn duplicate_tokens_are_rejected() -> TestResult {
    assert_invalid(
        parse(
            "[app]\nsession_salt = \"s\"\n[[auth.users]]\nid = \"1\"\ntoken = \"same\"\n\
             [[auth.users]]\nid = \"2\"\ntoken = \"same\"\n",
        ),
        "auth.users tokens must be unique",
    )
}

#[test]
fn invalid_bind_address_is_rejected() -> TestResult {
    assert_invalid(
        parse("[app]\nsession_salt = \"s\"\n[server]\nbind = \"localhost\"\n"),
        "invalid server.bind",
    )
}

#[test]
fn zero_body_limit_is_rejected() -> TestResult {
    assert_invalid(
        parse("[app]\nsession_salt = \"s\"\n[server]\nmax_body_bytes = 0\n"),
        "server.max_body_bytes",
    )
}

#[test]
fn unknown_journal_mode_fails_to_parse() -> TestResult {
    assert_invalid(
        parse("[app]\nsession_salt = \"s\"\n[store]\ntype = \"sqlite\"\npath = \"a\"\njournal_mode = \"memory\"\n"),
        "config parse error",
    )
}
