use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use debpull::app::App;
use debpull::config::{ConfigLoader, FetchConfig, FetchRequest};
use debpull::download::{CANCEL_EXIT_CODE, CancelToken};
use debpull::error::DebpullError;
use debpull::host::DpkgHost;
use debpull::output::{ConsoleOutput, JsonOutput, OutputMode};
use debpull::repo::RepoHttpClient;

#[derive(Parser)]
#[command(name = "debpull")]
#[command(about = "Download (and optionally install) a .deb from an APT repository without adding it as a source")]
#[command(author)]
struct Cli {
    /// Repository line (`deb [opts] URL DIST COMPONENT`) or bare base URL
    #[arg(long)]
    url: String,

    #[arg(long = "dist", visible_alias = "distribution")]
    dist: Option<String>,

    /// Component [default: main]
    #[arg(long)]
    component: Option<String>,

    /// Package name; may be omitted when the index holds a single package
    #[arg(long)]
    package: Option<String>,

    /// Exact version, or `latest`
    #[arg(long)]
    version: Option<String>,

    /// Architecture [default: host architecture]
    #[arg(long)]
    arch: Option<String>,

    /// Destination directory [default: system temporary directory]
    #[arg(long = "output-dir", short = 'o')]
    output_dir: Option<Utf8PathBuf>,

    /// Install the package after downloading it
    #[arg(long)]
    install: bool,

    /// Reinstall even when the same version is already installed
    #[arg(long)]
    force: bool,

    /// Download again even when the file already exists
    #[arg(long)]
    overwrite: bool,

    /// Resolve the package and print where it would be saved
    #[arg(long)]
    dry_run: bool,

    /// JSON defaults file
    #[arg(long)]
    config: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(usage_exit_code(&err));
        }
    };
    if let Err(report) = run(cli) {
        if let Some(err) = report.downcast_ref::<DebpullError>() {
            if err.is_cancelled() {
                eprintln!("cancelled; partial download removed");
            } else {
                eprintln!("{report:?}");
            }
            return ExitCode::from(map_exit_code(err));
        }
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DebpullError) -> u8 {
    match error {
        DebpullError::Cancelled => CANCEL_EXIT_CODE as u8,
        _ => 1,
    }
}

/// Usage errors fail like any other error; `--help` output is a success.
fn usage_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() { 1 } else { 0 }
}

fn run(cli: Cli) -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let defaults = ConfigLoader::resolve(cli.config.as_deref())?;
    let config = FetchConfig::build(
        FetchRequest {
            url: cli.url,
            distribution: cli.dist,
            component: cli.component,
            package: cli.package,
            version: cli.version,
            arch: cli.arch,
            output_dir: cli.output_dir,
            install: cli.install,
            force: cli.force,
            overwrite: cli.overwrite,
            dry_run: cli.dry_run,
        },
        &defaults,
    )?;

    let cancel = CancelToken::new();
    cancel.install_handler()?;
    let client = RepoHttpClient::new(&defaults.client_settings())?;
    let app = App::new(client, DpkgHost::new(), cancel);

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch(&config, &JsonOutput)?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.fetch(&config, &ConsoleOutput)?;
            ConsoleOutput::print_fetch(&result);
        }
    }
    Ok(())
}
