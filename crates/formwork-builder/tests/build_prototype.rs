// formwork-builder/tests/build_prototype.rs
// ============================================================================
// Module: Prototype Build Tests
// Description: End-to-end builds of JSON and YAML prototypes.
// ============================================================================
//! ## Overview
//! Builds prototypes into temporary folders and loads the output back through
//! the configuration loader and the widget loader.

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

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use formwork_builder::BuildError;
use formwork_builder::BuildOptions;
use formwork_builder::REGENERATE_ALLOWED_TAG;
use formwork_builder::build;
use formwork_config::FormworkConfig;
use formwork_config::StoreType;
use formwork_core::runtime::WidgetLoader;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Writes the prototype fixtures and returns the input and output folders.
fn fixtures(root: &Path) -> (PathBuf, PathBuf) {
    let input = root.join("prototype");
    let output = root.join("app");
    fs::create_dir_all(&input).unwrap();
    fs::create_dir_all(&output).unwrap();
    let prototype = json!({
        "ConfigApp": {"name": "Acme CRM", "url": "http://localhost:8080", "language": "sk"},
        "ConfigEnv": {"store": {"type": "sqlite", "path": "data/app.sqlite"}},
        "Widgets": {
            "Crm/Customers": {
                "title": "Customers",
                "icon": "users",
                "models": {
                    "Customer": {
                        "lookup_pattern": "{%name%}",
                        "columns": {
                            "name": {"type": "varchar", "required": true},
                            "active": {"type": "boolean"}
                        }
                    }
                },
                "actions": {
                    "List": {"template": "Table", "title": "Customers & partners"},
                    "Detail/Edit": {"template": "Form"},
                    "Notes": {"view": "<p>{{ viewParams.appName }}</p>"}
                }
            },
            "Blog": "@import blog.yaml"
        }
    });
    fs::write(input.join("index.json"), prototype.to_string()).unwrap();
    fs::write(
        input.join("blog.yaml"),
        "title: Blog\nactions:\n  About:\n    template: Blank\n    title: About us\n",
    )
    .unwrap();
    (input, output)
}

fn options(input: &Path, output: &Path, admin: Option<&str>) -> BuildOptions {
    BuildOptions {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        session_salt: "salt-1".to_string(),
        log_file: output.join("build.log"),
        admin_password: admin.map(str::to_string),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn build_produces_a_loadable_application() {
    let dir = TempDir::new().unwrap();
    let (input, output) = fixtures(dir.path());
    let report = build(options(&input, &output, Some("secret-admin"))).unwrap();
    assert_eq!(report.admin_token, "secret-admin");
    assert!(report.skipped.is_empty());

    let config = FormworkConfig::load(Some(&output.join("formwork.toml"))).unwrap();
    assert_eq!(config.app.name, "Acme CRM");
    assert_eq!(config.app.session_salt, "salt-1");
    assert_eq!(config.store.store_type, StoreType::Sqlite);
    let users = config.auth.token_users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].0, "secret-admin");
    assert!(users[0].1.is_administrator());
    assert_eq!(
        config.widgets,
        json!({"Crm": {"Customers": {"enabled": true}}, "Blog": {"enabled": true}})
    );

    let loader = WidgetLoader::new(output.join("src/Widgets"));
    let customers = loader.load("Crm/Customers").unwrap();
    assert_eq!(customers.manifest.title.as_deref(), Some("Customers"));
    assert_eq!(customers.models.len(), 1);
    assert_eq!(customers.models[0].name.as_str(), "Crm/Customers/Customer");
    assert_eq!(customers.models[0].table, "crm_customers_customer");
    let patterns: Vec<&str> =
        customers.manifest.routes.iter().map(|route| route.pattern.as_str()).collect();
    assert_eq!(
        patterns,
        vec![
            "^crm/customers/?$",
            "^crm/customers/list/?$",
            "^crm/customers/detail/edit/?$",
            "^crm/customers/notes/?$"
        ]
    );
    assert_eq!(
        customers.manifest.routes[1].view.as_deref(),
        Some("Widgets/Crm/Customers/Views/List")
    );
    let blog = loader.load("Blog").unwrap();
    assert_eq!(blog.manifest.routes[0].controller, "Dashboard");
}

#[test]
fn build_renders_views_and_logs_every_step() {
    let dir = TempDir::new().unwrap();
    let (input, output) = fixtures(dir.path());
    build(options(&input, &output, None)).unwrap();

    let views = output.join("src/Widgets/Crm/Customers/Views");
    let table = fs::read_to_string(views.join("List.html")).unwrap();
    assert!(table.contains(REGENERATE_ALLOWED_TAG));
    assert!(table.contains("<h1>Customers &amp; partners</h1>"));
    assert!(table.contains("{{ viewParams.table.itemsPerPage }}"));
    assert!(views.join("Detail/Edit.html").is_file());
    let notes = fs::read_to_string(views.join("Notes.html")).unwrap();
    assert!(notes.ends_with("<p>{{ viewParams.appName }}</p>\n"));
    let about = fs::read_to_string(output.join("src/Widgets/Blog/Views/About.html")).unwrap();
    assert!(about.contains("About us"));

    let desktop = fs::read_to_string(output.join("src/Views/Desktop.html")).unwrap();
    assert!(desktop.contains("<html lang=\"sk\">"));
    assert!(desktop.contains("{{ viewParams.contentHtml | safe }}"));
    assert!(output.join("src/Assets/app.css").is_file());
    assert!(output.join("upload/.gitkeep").is_file());
    assert!(output.join("src/Lang").is_dir());

    let log = fs::read_to_string(output.join("build.log")).unwrap();
    assert!(log.contains("Building widget Crm/Customers."));
    assert!(log.contains("Importing "));
    assert!(log.contains("Build finished."));
}

#[test]
fn files_without_the_tag_survive_a_rebuild() {
    let dir = TempDir::new().unwrap();
    let (input, output) = fixtures(dir.path());
    let first = build(options(&input, &output, None)).unwrap();
    assert!(first.admin_token.starts_with("admin."));
    fs::write(output.join("src/Views/Desktop.html"), "<!-- customized -->").unwrap();
    fs::write(output.join("tmp/cache.bin"), "stale").unwrap();

    let second = build(options(&input, &output, None)).unwrap();
    assert_eq!(second.skipped, vec![PathBuf::from("src/Views/Desktop.html")]);
    assert_eq!(
        fs::read_to_string(output.join("src/Views/Desktop.html")).unwrap(),
        "<!-- customized -->"
    );
    assert!(!output.join("tmp/cache.bin").exists());
    let sign_in = fs::read_to_string(output.join("src/Views/SignIn.html")).unwrap();
    assert!(sign_in.contains(REGENERATE_ALLOWED_TAG));
}

#[test]
fn invalid_inputs_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (input, output) = fixtures(dir.path());

    let missing_output = build(options(&input, &dir.path().join("missing"), None));
    assert!(matches!(missing_output, Err(BuildError::Io(_))));

    let no_app = dir.path().join("no-app.yaml");
    fs::write(&no_app, "Widgets: {}\n").unwrap();
    let err = build(options(&no_app, &output, None)).unwrap_err();
    assert!(err.to_string().contains("ConfigApp is missing"));

    let bad_template = dir.path().join("bad.json");
    fs::write(
        &bad_template,
        json!({"ConfigApp": {}, "Widgets": {"Shop": {"actions": {"Cart": {"template": "Grid"}}}}})
            .to_string(),
    )
    .unwrap();
    let err = build(options(&bad_template, &output, None)).unwrap_err();
    assert!(err.to_string().contains("unknown template Grid"));

    let bad_widget = dir.path().join("bad-widget.json");
    fs::write(&bad_widget, json!({"ConfigApp": {}, "Widgets": {"../x": {}}}).to_string())
        .unwrap();
    let err = build(options(&bad_widget, &output, None)).unwrap_err();
    assert!(matches!(err, BuildError::Prototype(_)));
}
