// crates/nmos-testing-cli/src/main.rs
// ============================================================================
// Module: NMOS Testing CLI Entry Point
// Description: Command dispatcher for conformance runs and config checks.
// Purpose: Wire config, transports and logging into the suite runner.
// Dependencies: clap, nmos-testing-*, thiserror
// ============================================================================

//! ## Overview
//! `nmos-testing run` loads `nmos-testing.toml`, runs the suite, writes one
//! JSON outcome per line to stdout (or `--output`), prints a verdict tally to
//! stderr, and exits non-zero when any outcome is a FAIL. Run events go to
//! the configured log file, or to stderr as JSON lines.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use nmos_testing_cli::CrawlSettings;
use nmos_testing_cli::OutcomeWriter;
use nmos_testing_cli::SuiteContext;
use nmos_testing_cli::TEST_CASES;
use nmos_testing_cli::has_failures;
use nmos_testing_cli::http_client_config;
use nmos_testing_cli::run_suite;
use nmos_testing_cli::session_timings;
use nmos_testing_cli::summary_line;
use nmos_testing_config::ConfigError;
use nmos_testing_config::TestingConfig;
use nmos_testing_core::IdentifierCache;
use nmos_testing_core::JsonLineLog;
use nmos_testing_core::RunLog;
use nmos_testing_core::TestOutcome;
use nmos_testing_core::TransportError;
use nmos_testing_transport::ReqwestHttpClient;
use nmos_testing_transport::WebSocketConnector;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "nmos-testing", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the conformance suite against the configured APIs.
    Run(RunCommand),
    /// List the registered test cases.
    List,
    /// Validate the configuration and every surface manifest.
    CheckConfig(ConfigArgs),
}

/// Config file selection shared by subcommands.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config file path (overrides `NMOS_TESTING_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `run`.
#[derive(Args, Debug)]
struct RunCommand {
    /// Config file selection.
    #[command(flatten)]
    config: ConfigArgs,
    /// Write outcomes to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Run only the named registered case; repeatable.
    #[arg(long = "case", value_name = "NAME")]
    cases: Vec<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures that prevent a run from producing outcomes.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A transport could not be constructed.
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
    /// An output stream could not be written.
    #[error("failed to write {target}: {source}")]
    Output {
        /// Stream or file label.
        target: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// `--case` named an unregistered case.
    #[error("unknown test case: {0}")]
    UnknownCase(String),
}

impl CliError {
    /// Builds an output error for `target`.
    fn output(target: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let target = target.into();
        move |source| Self::Output {
            target,
            source,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(command) => command_run(&command),
        Commands::List => command_list(),
        Commands::CheckConfig(args) => command_check_config(&args),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `run`.
fn command_run(command: &RunCommand) -> CliResult<ExitCode> {
    let registered = |name: &&String| TEST_CASES.iter().any(|case| case.name == name.as_str());
    if let Some(unknown) = command.cases.iter().find(|name| !registered(name)) {
        return Err(CliError::UnknownCase(unknown.clone()));
    }
    let config = TestingConfig::load(command.config.config.as_deref())?;
    let surfaces = config.load_surfaces()?;
    let log = open_run_log(config.log_path().as_deref())?;
    let timings = session_timings(&config.session);
    let client =
        ReqwestHttpClient::new(&http_client_config(&config.http))?.with_log(Arc::clone(&log));
    let connector = WebSocketConnector::new(timings.open_timeout)?.with_log(Arc::clone(&log));

    let mut ctx = SuiteContext {
        client: Arc::new(client),
        connector: Arc::new(connector),
        surfaces,
        cache: IdentifierCache::new(),
        model: None,
        timings,
        clock: None,
        log,
    };
    let crawl = CrawlSettings {
        schema_root: config.schema_root(),
        expansion: config.crawler.expansion,
        omit_paths: config.crawler.omit_paths.clone(),
    };
    let selected = (!command.cases.is_empty()).then_some(command.cases.as_slice());
    let outcomes = run_suite(&mut ctx, &crawl, selected);

    write_outcomes(command.output.as_deref(), &outcomes)?;
    write_stderr_line(&summary_line(&outcomes)).map_err(CliError::output("stderr"))?;
    Ok(if has_failures(&outcomes) { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// Executes `list`.
fn command_list() -> CliResult<ExitCode> {
    for case in TEST_CASES {
        write_stdout_line(&format!("{}\t{}", case.name, case.description))
            .map_err(CliError::output("stdout"))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `check-config`.
fn command_check_config(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = TestingConfig::load(args.config.as_deref())?;
    let surfaces = config.load_surfaces()?;
    let resources: usize = surfaces.values().map(|surface| surface.resources().len()).sum();
    write_stdout_line(&format!(
        "config ok: {} apis, {resources} declared resources",
        surfaces.len()
    ))
    .map_err(CliError::output("stdout"))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Opens the run log sink.
fn open_run_log(path: Option<&Path>) -> CliResult<Arc<dyn RunLog>> {
    match path {
        Some(path) => {
            let file = File::create(path).map_err(CliError::output(path.display().to_string()))?;
            Ok(Arc::new(JsonLineLog::new(file)))
        }
        None => Ok(Arc::new(JsonLineLog::new(io::stderr()))),
    }
}

/// Writes outcomes to `path`, or stdout when absent.
fn write_outcomes(path: Option<&Path>, outcomes: &[TestOutcome]) -> CliResult<()> {
    match path {
        Some(path) => {
            let label = path.display().to_string();
            let file = File::create(path).map_err(CliError::output(label.clone()))?;
            OutcomeWriter::new(BufWriter::new(file))
                .write_all(outcomes)
                .map_err(CliError::output(label))
        }
        None => OutcomeWriter::new(io::stdout().lock())
            .write_all(outcomes)
            .map_err(CliError::output("stdout")),
    }
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> io::Result<()> {
    let mut stderr = io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
