// formwork-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Runs the `formwork` binary against temporary applications.
// Purpose: Ensure each command reports success and failure through exit codes.
// Dependencies: formwork-cli binary, tempfile
// ============================================================================
//! ## Overview
//! Builds a prototype into a temporary folder with `formwork build`, then
//! installs, lists, renders, and edits settings of the generated application.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn formwork_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_formwork"))
}

fn run(args: &[&str]) -> Output {
    Command::new(formwork_bin())
        .args(args)
        .env_remove("FORMWORK_LANG")
        .env_remove("FORMWORK_CONFIG")
        .output()
        .expect("run formwork")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Builds a small CRM prototype and returns the generated config path.
fn built_app(root: &Path) -> PathBuf {
    let prototype = root.join("prototype.json");
    let output = root.join("app");
    fs::create_dir_all(&output).unwrap();
    let document = json!({
        "ConfigApp": {"name": "Acme CRM"},
        "ConfigEnv": {"store": {"type": "sqlite", "path": "data/app.sqlite"}},
        "Widgets": {
            "Crm": {
                "models": {
                    "Customer": {
                        "columns": {"name": {"type": "varchar", "required": true}}
                    }
                },
                "actions": {"Customers": {"template": "Table"}}
            }
        }
    });
    fs::write(&prototype, document.to_string()).unwrap();
    let result = run(&[
        "build",
        "--input",
        prototype.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
        "--admin-password",
        "admin-secret",
    ]);
    assert!(result.status.success(), "build failed: {}", stderr(&result));
    assert!(stdout(&result).contains("Administrator token: admin-secret"));
    assert!(output.join("build.log").is_file());
    output.join("formwork.toml")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn built_app_installs_lists_and_renders() {
    let dir = TempDir::new().unwrap();
    let config = built_app(dir.path());
    let config = config.to_str().unwrap();

    let validated = run(&["config", "validate", "--config", config]);
    assert!(validated.status.success(), "{}", stderr(&validated));
    assert_eq!(stdout(&validated).trim(), "Config valid.");

    let installed = run(&["install", "--config", config]);
    assert!(installed.status.success(), "{}", stderr(&installed));
    assert!(stdout(&installed).contains("Installed Crm/Customer into table crm_customer"));

    let listed = run(&["models", "list", "--config", config]);
    assert!(stdout(&listed).contains("Crm/Customer (table crm_customer, 1 columns)"));

    let saved = run(&[
        "render",
        "api/record/save",
        r#"{"model": "Crm/Customer", "record": {"name": "Acme"}}"#,
        "--config",
        config,
        "--token",
        "admin-secret",
    ]);
    assert!(saved.status.success(), "{}", stderr(&saved));
    let body: Value = serde_json::from_str(stdout(&saved).trim()).unwrap();
    assert_eq!(body["status"], json!("success"));

    let listed = run(&[
        "render",
        "api/record/get-list",
        r#"{"model": "Crm/Customer"}"#,
        "--config",
        config,
        "--token",
        "admin-secret",
    ]);
    let body: Value = serde_json::from_str(stdout(&listed).trim()).unwrap();
    assert_eq!(body["total"], json!(1));
}

#[test]
fn render_failures_exit_with_code_one() {
    let dir = TempDir::new().unwrap();
    let config = built_app(dir.path());
    let config = config.to_str().unwrap();
    assert!(run(&["install", "--config", config]).status.success());

    let anonymous =
        run(&["render", "api/record/get-list", r#"{"model": "Crm/Customer"}"#, "--config", config]);
    assert_eq!(anonymous.status.code(), Some(1));
    assert!(stdout(&anonymous).contains("not_authenticated"));
    assert!(stderr(&anonymous).contains("401"));

    let bad_params = run(&["render", "api/record/get-list", "[]", "--config", config]);
    assert_eq!(bad_params.status.code(), Some(1));
    assert!(stderr(&bad_params).contains("JSON object"));
}

#[test]
fn settings_round_trip_through_the_store() {
    let dir = TempDir::new().unwrap();
    let config = built_app(dir.path());
    let config = config.to_str().unwrap();

    let set = run(&["settings", "set", "app/theme", r#"{"color": "red"}"#, "--config", config]);
    assert!(set.status.success(), "{}", stderr(&set));

    let get = run(&["settings", "get", "app/theme/color", "--config", config]);
    assert!(get.status.success(), "{}", stderr(&get));
    assert_eq!(stdout(&get).trim(), "\"red\"");

    let deleted = run(&["settings", "delete", "app", "--config", config]);
    assert!(deleted.status.success());
    let missing = run(&["settings", "get", "app/theme", "--config", config]);
    assert_eq!(missing.status.code(), Some(1));
    assert!(stderr(&missing).contains("No setting stored at app/theme."));
}

#[test]
fn missing_config_and_bad_language_fail() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    let result = run(&["config", "validate", "--config", missing.to_str().unwrap()]);
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr(&result).contains("Failed to load config"));

    let result = Command::new(formwork_bin())
        .args(["config", "validate", "--config", missing.to_str().unwrap()])
        .env("FORMWORK_LANG", "xx")
        .output()
        .unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr(&result).contains("FORMWORK_LANG"));

    let slovak =
        run(&["--lang", "sk", "config", "validate", "--config", missing.to_str().unwrap()]);
    assert!(stderr(&slovak).contains("Konfiguráciu sa nepodarilo načítať"));
}
