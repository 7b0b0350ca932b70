use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use kira_pdb::app::{App, CancelToken};
use kira_pdb::archive::ArchiveHttpClient;
use kira_pdb::cli::{Cli, Command, normalize_args, short_usage, usage};
use kira_pdb::config::{ConfigLoader, SettingsOverrides};
use kira_pdb::error::KiraError;
use kira_pdb::output::{JsonOutput, OutputMode, TextOutput};
use kira_pdb::rcsb::RcsbHttpClient;

const PROGRAM: &str = "kira-pdb";

fn main() -> ExitCode {
    let args = normalize_args(std::env::args());
    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            if let Some(reason) = err.kind().as_str().filter(|_| args.len() > 1) {
                eprintln!("error: {reason}");
            }
            print!("\n{}\n", short_usage(PROGRAM));
            return ExitCode::from(1);
        }
    };

    if let Err(report) = run(cli) {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::ConfigRead(_) | KiraError::ConfigParse(_) => 2,
        err if err.is_remote() => 3,
        _ => 1,
    }
}

fn run(cli: Cli) -> miette::Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if matches!(cli.command, Command::Help) {
        print!("{}", usage(PROGRAM));
        return Ok(());
    }

    let settings = ConfigLoader::resolve(
        cli.config.as_deref(),
        SettingsOverrides {
            output_dir: cli.output_dir.clone(),
            workers: cli.jobs,
            timeout_secs: cli.timeout,
        },
    )?;
    let rcsb = RcsbHttpClient::new(&settings)?;
    let archive = ArchiveHttpClient::new(&settings)?;
    let app = App::new(settings, rcsb, archive);

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let text = TextOutput::new(std::io::stdout().is_terminal());

    match cli.command {
        Command::Help => Ok(()),
        Command::Search(args) => match output_mode {
            OutputMode::Json => {
                let result = app.search(&args.ids, &JsonOutput);
                JsonOutput::print_search(&result).into_diagnostic()
            }
            OutputMode::Text => {
                let result = app.search(&args.ids, &text);
                text.print_search(&result).into_diagnostic()
            }
        },
        Command::Get(args) => {
            let policy = args.policy();
            let cancel = CancelToken::new();
            if let Err(err) = cancel.cancel_on_interrupt() {
                warn!(error = %err, "Ctrl-C will abort without a report");
            }
            match output_mode {
                OutputMode::Json => {
                    let result = app.get(&args.ids, policy, &cancel, &JsonOutput)?;
                    JsonOutput::print_get(&result).into_diagnostic()
                }
                OutputMode::Text => {
                    let result = app.get(&args.ids, policy, &cancel, &text)?;
                    text.print_get(&result).into_diagnostic()
                }
            }
        }
    }
}
