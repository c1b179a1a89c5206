// formwork-cli/src/main.rs
// ============================================================================
// Module: Formwork CLI Entry Point
// Description: Command dispatcher for serving, administering, and building apps.
// Purpose: Provide a localized CLI over the Formwork runtime and builder.
// Dependencies: clap, formwork-builder, formwork-config, formwork-server, serde_jcs, tokio.
// ============================================================================

//! ## Overview
//! The `formwork` binary runs the HTTP server, installs model tables, renders
//! routes through the CLI interface, edits persisted settings, and builds
//! applications from prototypes. All user-facing strings are routed through
//! the i18n catalog. Failures are written to stderr with exit code 1.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use formwork_builder::BuildOptions;
use formwork_cli::i18n::Locale;
use formwork_cli::i18n::set_locale;
use formwork_cli::t;
use formwork_config::FormworkConfig;
use formwork_core::AppRequest;
use formwork_core::Application;
use formwork_server::FormworkServer;
use formwork_server::build_application;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Environment variable for CLI locale selection.
const LANG_ENV: &str = "FORMWORK_LANG";
/// Build log file name inside the output folder.
const DEFAULT_BUILD_LOG: &str = "build.log";
/// Length of generated session salts.
const SESSION_SALT_LEN: usize = 32;
/// First status code reported as a failed render.
const FAILURE_STATUS: u16 = 400;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "formwork", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Preferred output language (overrides `FORMWORK_LANG`).
    #[arg(long, value_enum, value_name = "LANG", global = true)]
    lang: Option<LangArg>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server.
    Serve(ConfigArgs),
    /// Create the tables of every registered model.
    Install(ConfigArgs),
    /// Render a route through the CLI interface and print the response body.
    Render(RenderCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Persisted settings utilities.
    Settings {
        /// Selected settings subcommand.
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Model registry utilities.
    Models {
        /// Selected models subcommand.
        #[command(subcommand)]
        command: ModelsCommand,
    },
    /// Build an application folder from a prototype.
    Build(BuildCommand),
}

/// Config file selection shared by application commands.
#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// Config file path (defaults to `FORMWORK_CONFIG`, then ./formwork.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for the `render` command.
#[derive(Args, Debug)]
struct RenderCommand {
    /// Route to render, without the rewrite base.
    route: String,
    /// Request parameters as a JSON object.
    params: Option<String>,
    /// Bearer token of the acting user.
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,
    /// Config file selection.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a config file.
    Validate(ConfigArgs),
}

/// Settings subcommands.
#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the value stored at a path.
    Get(SettingsPathCommand),
    /// Store a JSON value at a path.
    Set(SettingsSetCommand),
    /// Delete a path and everything below it.
    Delete(SettingsPathCommand),
}

/// Arguments addressing one settings path.
#[derive(Args, Debug)]
struct SettingsPathCommand {
    /// Slash-separated settings path.
    path: String,
    /// Config file selection.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Arguments for `settings set`.
#[derive(Args, Debug)]
struct SettingsSetCommand {
    /// Slash-separated settings path.
    path: String,
    /// JSON value to store.
    value: Option<String>,
    /// Config file selection.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Models subcommands.
#[derive(Subcommand, Debug)]
enum ModelsCommand {
    /// List registered models and their tables.
    List(ConfigArgs),
}

/// Arguments for the `build` command.
#[derive(Args, Debug)]
struct BuildCommand {
    /// Prototype file (`.json`, `.yml`, `.yaml`) or folder with `index.json`.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Existing output folder.
    #[arg(long, value_name = "DIR")]
    output: PathBuf,
    /// Session salt written to the generated config (random when omitted).
    #[arg(long, value_name = "SALT")]
    session_salt: Option<String>,
    /// Build log path (defaults to `<output>/build.log`).
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Administrator token written to the generated config.
    #[arg(long, value_name = "PASSWORD")]
    admin_password: Option<String>,
}

/// Supported CLI language selections.
#[derive(ValueEnum, Copy, Clone, Debug)]
enum LangArg {
    /// English.
    En,
    /// Slovak.
    Sk,
}

impl From<LangArg> for Locale {
    fn from(value: LangArg) -> Self {
        match value {
            LangArg::En => Self::En,
            LangArg::Sk => Self::Sk,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for localized error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a localized message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let env_lang = std::env::var(LANG_ENV).ok();
    let locale = resolve_locale(cli.lang, env_lang.as_deref())?;
    set_locale(locale);
    if locale != Locale::En {
        write_stderr_line(&t!("i18n.disclaimer.machine_translated"))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Install(command) => command_install(&command),
        Commands::Render(command) => command_render(&command),
        Commands::Config {
            command,
        } => command_config(&command),
        Commands::Settings {
            command,
        } => command_settings(&command),
        Commands::Models {
            command,
        } => command_models(&command),
        Commands::Build(command) => command_build(command),
    }
}

/// Emits the top-level help message for the CLI.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Application Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(&command)?;
    let server = tokio::task::spawn_blocking(move || FormworkServer::from_config(&config))
        .await
        .map_err(|err| {
            CliError::new(t!("serve.init_failed", error = format!("init join failed: {err}")))
        })?
        .map_err(|err| CliError::new(t!("serve.init_failed", error = err)))?;
    write_stdout(&t!(
        "serve.listening",
        app = server.application().options().name,
        bind = server.bind_addr()
    ))?;
    server.serve().await.map_err(|err| CliError::new(t!("serve.failed", error = err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `install` command.
fn command_install(command: &ConfigArgs) -> CliResult<ExitCode> {
    let app = open_application(command)?;
    let outcomes = app.install().map_err(|err| CliError::new(t!("install.failed", error = err)))?;
    for outcome in &outcomes {
        write_stdout(&t!("install.table", model = outcome.model, table = outcome.table))?;
    }
    write_stdout(&t!("install.ok", count = outcomes.len()))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `render` command.
fn command_render(command: &RenderCommand) -> CliResult<ExitCode> {
    let params = parse_params(command.params.as_deref())?;
    let app = open_application(&command.config)?;
    let mut request = AppRequest::cli(command.route.clone(), params);
    if let Some(token) = &command.token {
        request = request.with_token(token.clone());
    }
    let response = app.render(&request);
    if let Some(location) = &response.location {
        write_stdout(&t!("render.redirect", location = location))?;
        return Ok(ExitCode::SUCCESS);
    }
    write_stdout(&response.body)?;
    if response.status >= FAILURE_STATUS {
        return Ok(emit_error(&t!("render.status_failed", status = response.status)));
    }
    Ok(ExitCode::SUCCESS)
}

/// Dispatches config subcommands.
fn command_config(command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => {
            load_config(command)?;
            write_stdout(&t!("config.validate.ok"))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Dispatches settings subcommands.
fn command_settings(command: &SettingsCommand) -> CliResult<ExitCode> {
    match command {
        SettingsCommand::Get(command) => {
            let app = open_application(&command.config)?;
            let value = app.settings().get(&command.path).ok_or_else(|| {
                CliError::new(t!("settings.get.not_found", path = command.path))
            })?;
            let text = serde_jcs::to_string(&value).map_err(|err| {
                CliError::new(t!("settings.render_failed", path = command.path, error = err))
            })?;
            write_stdout(&text)?;
        }
        SettingsCommand::Set(command) => {
            let value = parse_setting_value(&command.path, command.value.as_deref())?;
            let app = open_application(&command.config)?;
            save_setting(&app, &command.path, &value)?;
            write_stdout(&t!("settings.set.ok", path = command.path))?;
        }
        SettingsCommand::Delete(command) => {
            let app = open_application(&command.config)?;
            save_setting(&app, &command.path, &Value::Null)?;
            write_stdout(&t!("settings.delete.ok", path = command.path))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Dispatches models subcommands.
fn command_models(command: &ModelsCommand) -> CliResult<ExitCode> {
    match command {
        ModelsCommand::List(command) => {
            let app = open_application(command)?;
            if app.registry().is_empty() {
                write_stdout(&t!("models.none"))?;
            }
            for model in app.registry().models() {
                write_stdout(&t!(
                    "models.entry",
                    name = model.name,
                    table = model.table,
                    columns = model.columns.len()
                ))?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Build Command
// ============================================================================

/// Executes the `build` command.
fn command_build(command: BuildCommand) -> CliResult<ExitCode> {
    let log_file = command.log.unwrap_or_else(|| default_log_path(&command.output));
    if let Some(parent) = log_file.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            CliError::new(t!("build.log_failed", path = log_file.display(), error = err))
        })?;
    }
    let options = BuildOptions {
        input: command.input,
        output: command.output.clone(),
        session_salt: command.session_salt.unwrap_or_else(generate_session_salt),
        log_file,
        admin_password: command.admin_password,
    };
    let report = formwork_builder::build(options)
        .map_err(|err| CliError::new(t!("build.failed", error = err)))?;
    for path in &report.skipped {
        write_stdout(&t!("build.skipped", path = path.display()))?;
    }
    write_stdout(&t!(
        "build.ok",
        path = command.output.display(),
        written = report.written.len(),
        skipped = report.skipped.len()
    ))?;
    write_stdout(&t!("build.admin_token", token = report.admin_token))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates the selected config file.
fn load_config(args: &ConfigArgs) -> CliResult<FormworkConfig> {
    FormworkConfig::load(args.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))
}

/// Loads the config and assembles the application it describes.
fn open_application(args: &ConfigArgs) -> CliResult<Application> {
    let config = load_config(args)?;
    build_application(&config).map_err(|err| CliError::new(t!("app.init_failed", error = err)))
}

/// Writes or deletes one setting.
fn save_setting(app: &Application, path: &str, value: &Value) -> CliResult<()> {
    app.settings()
        .save(path, value, None)
        .map_err(|err| CliError::new(t!("settings.save_failed", path = path, error = err)))
}

/// Parses optional request parameters; absent input yields an empty object.
fn parse_params(raw: Option<&str>) -> CliResult<Map<String, Value>> {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(params)) => Ok(params),
        Ok(_) => Err(CliError::new(t!("render.params_invalid", error = "not an object"))),
        Err(err) => Err(CliError::new(t!("render.params_invalid", error = err))),
    }
}

/// Parses the JSON value of `settings set`.
fn parse_setting_value(path: &str, raw: Option<&str>) -> CliResult<Value> {
    let raw = raw.ok_or_else(|| CliError::new(t!("settings.value_missing", path = path)))?;
    serde_json::from_str(raw)
        .map_err(|err| CliError::new(t!("settings.value_invalid", error = err)))
}

/// Returns the default build log path for an output folder.
fn default_log_path(output: &Path) -> PathBuf {
    output.join(DEFAULT_BUILD_LOG)
}

/// Generates a random alphanumeric session salt.
fn generate_session_salt() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(SESSION_SALT_LEN).map(char::from).collect()
}

/// Resolves the CLI locale from the flag, then the environment.
fn resolve_locale(lang: Option<LangArg>, env_lang: Option<&str>) -> CliResult<Locale> {
    if let Some(lang) = lang {
        return Ok(lang.into());
    }
    if let Some(value) = env_lang {
        return Locale::parse(value).ok_or_else(|| {
            CliError::new(t!("i18n.lang.invalid_env", env = LANG_ENV, value = value))
        });
    }
    Ok(Locale::En)
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes a line to stdout, mapping failures to a localized error.
fn write_stdout(message: &str) -> CliResult<()> {
    write_stdout_line(message).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats a localized output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
