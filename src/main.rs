/*
 * Command-line front end for the scoring model editor. Opens a model document,
 * logs the weight balance of every factor and optionally exports the
 * normalized document.
 *
 * Usage: scoring_model [DOCUMENT] [--export [PATH]]
 *
 * Without DOCUMENT the last opened document is used, falling back to
 * `model.json` in the working directory.
 */
use scoring_model::app_logic::{APP_NAME, ModelEditor};
use scoring_model::core::{
    CoreConfigManager, CoreDocumentStore, DEFAULT_EXPORT_FILENAME, path_utils,
};

use clap::{Parser, ValueHint};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Opens a scoring model document and reports the weight balance of every factor
#[derive(Parser, Debug)]
#[command(name = "scoring_model")]
#[command(version, about, long_about = None)]
struct CliArgs {
    /// Model document (default: last opened, then ./model.json)
    #[arg(value_hint = ValueHint::FilePath)]
    document: Option<PathBuf>,

    /// Write the normalized document to PATH
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = DEFAULT_EXPORT_FILENAME,
        value_hint = ValueHint::FilePath
    )]
    export: Option<PathBuf>,
}

fn initialize_logging() {
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    if let Some(log_path) = path_utils::get_log_file_path(APP_NAME) {
        match File::create(&log_path) {
            Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file)),
            Err(e) => eprintln!("Could not create log file {log_path:?}: {e}"),
        }
    }

    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Failed to initialize logger: {e}");
    }
}

fn main() -> ExitCode {
    initialize_logging();
    log::debug!("Application starting...");

    let cli = CliArgs::parse();
    let mut editor = ModelEditor::new(
        Arc::new(CoreConfigManager::new()),
        Arc::new(CoreDocumentStore::new()),
    );

    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let document_path = editor.resolve_document_path(cli.document, &working_dir);

    if let Err(e) = editor.open_document(&document_path) {
        log::error!("Could not open {document_path:?}: {e}");
        return ExitCode::FAILURE;
    }

    for line in editor.balance_report() {
        log::info!("{line}");
    }

    if let Some(export_path) = cli.export {
        if let Err(e) = editor.export_to(&export_path) {
            log::error!("Could not export to {export_path:?}: {e}");
            return ExitCode::FAILURE;
        }
    }

    log::debug!("Application exiting.");
    ExitCode::SUCCESS
}
