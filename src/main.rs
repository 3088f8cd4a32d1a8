//! tickcell - backtick-embedded Rhai snippets in spreadsheet formulas

mod error;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use directories::ProjectDirs;
use tickcell_core::document::DEFAULT_SHEET;
use tickcell_core::{Diagnostics, HostDocument, RunState, Session, Settings, Workbook, storage};
use tickcell_engine::engine::{CellAddress, CellRef, Value, reconstruct};
use tracing_subscriber::EnvFilter;

use error::CliError;

fn print_usage() {
    eprintln!("Usage: tickcell [OPTIONS] [CSV]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [CSV]                     Data to load into the sheet, starting at A1");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e, --formula <TEXT>      Transform a formula placed below the data and print");
    eprintln!("                            its wrapper, value and reconstructed source");
    eprintln!("  -r, --reconstruct <TEXT>  Print the original formula of a wrapper formula");
    eprintln!("  -s, --sheet <NAME>        Sheet name for the data (default: Sheet1)");
    eprintln!("  -c, --config <PATH>       Settings file (default: <config dir>/tickcell/config.toml)");
    eprintln!("  -v, --verbose             Debug logging");
    eprintln!("  -h, --help                Print help");
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    csv: Option<PathBuf>,
    formula: Option<String>,
    reconstruct: Option<String>,
    sheet: Option<String>,
    config: Option<PathBuf>,
    verbose: bool,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<Options, CliError> {
    let mut options = Options::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => options.help = true,
            "-v" | "--verbose" => options.verbose = true,
            "-e" | "--formula" => options.formula = Some(option_value(args, &mut i, "--formula")?),
            "-r" | "--reconstruct" => {
                options.reconstruct = Some(option_value(args, &mut i, "--reconstruct")?);
            }
            "-s" | "--sheet" => options.sheet = Some(option_value(args, &mut i, "--sheet")?),
            "-c" | "--config" => {
                options.config = Some(PathBuf::from(option_value(args, &mut i, "--config")?));
            }
            arg if arg.starts_with('-') => return Err(CliError::UnknownOption(arg.to_string())),
            arg => {
                if options.csv.is_some() {
                    return Err(CliError::UnexpectedArgument(arg.to_string()));
                }
                options.csv = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    if !options.help && options.formula.is_none() && options.reconstruct.is_none() {
        return Err(CliError::NothingToDo);
    }
    Ok(options)
}

fn option_value(args: &[String], i: &mut usize, name: &'static str) -> Result<String, CliError> {
    *i += 1;
    args.get(*i).cloned().ok_or(CliError::MissingValue(name))
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            return ExitCode::from(2);
        }
    };
    if options.help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(options: &Options) -> anyhow::Result<()> {
    let settings = match config_path(options) {
        Some(path) => Settings::load(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Settings::default(),
    };
    init_logging(&settings, options.verbose);

    if let Some(text) = &options.reconstruct {
        let original = reconstruct(text).context("cannot reconstruct formula")?;
        println!("{}", original);
    }

    if let Some(formula) = &options.formula {
        let sheet = options.sheet.as_deref().unwrap_or(DEFAULT_SHEET);
        let workbook = Arc::new(Workbook::new(
            Arc::new(settings.build_compiler()),
            settings.limits(),
        ));
        workbook.add_sheet(sheet);
        if let Some(path) = &options.csv {
            storage::import_csv(&workbook, sheet, path, CellRef::new(0, 0))
                .with_context(|| format!("failed to import {}", path.display()))?;
        }
        transform_and_print(workbook, sheet, formula)?;
    }

    Ok(())
}

fn transform_and_print(workbook: Arc<Workbook>, sheet: &str, formula: &str) -> anyhow::Result<()> {
    let session = Session::for_workbook(Arc::clone(&workbook), Diagnostics::log_only());

    // One blank row between the data and the formula.
    let cell = match workbook.used_range(sheet) {
        Some(range) => CellRef::new(range.start.col, range.end.row + 2),
        None => CellRef::new(0, 0),
    };
    let target = CellAddress::new(sheet, cell);

    workbook.set_cell_from_input(&target, formula)?;
    for report in session.run_pending() {
        if report.state == RunState::Rejected
            && let Some(err) = report.error
        {
            return Err(err).context("formula rejected");
        }
    }

    println!("cell: {}", target);
    println!("wrapper: {}", workbook.cell_text(&target).unwrap_or_default());
    let value = workbook.value(&target);
    if matches!(value, Value::Array(_)) {
        println!("value:\n{}", value);
    } else {
        println!("value: {}", value);
    }
    if let Some(source) = session.edit_text(&target) {
        println!("source: {}", source);
    }
    let stats = session.compiler().cache().stats();
    tracing::debug!(
        compilations = stats.compilations,
        hits = stats.hits,
        cached = stats.len,
        "cache activity"
    );
    Ok(())
}

fn config_path(options: &Options) -> Option<PathBuf> {
    options.config.clone().or_else(|| {
        ProjectDirs::from("", "", "tickcell").map(|proj| proj.config_dir().join("config.toml"))
    })
}

fn init_logging(settings: &Settings, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_deref().unwrap_or("warn")));
    let filter = if verbose {
        filter.add_directive(tracing::Level::DEBUG.into())
    } else {
        filter
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
