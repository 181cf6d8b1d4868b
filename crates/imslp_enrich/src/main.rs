use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use imslp_enrich_core::config::{EnrichConfig, load_config, resolve_config_path};
use imslp_enrich_core::http::{Fetcher, ReqwestTransport, ThreadSleeper};
use imslp_enrich_core::site::WikiSite;
use imslp_enrich_core::wiki::MediaWikiClient;
use imslp_enrich_core::{Enricher, EnrichError, MetadataDocument};
use tracing::{Level, error};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const EXIT_USAGE: u8 = 1;
const EXIT_CLIENT_UNAVAILABLE: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "imslp_enrich",
    version,
    about = "Resolve an IMSLP page reference and print its metadata as one JSON object"
)]
struct Cli {
    /// Permalink, URL-encoded slug, or numeric page id
    target: String,
    #[arg(long, value_name = "PATH", help = "TOML config file")]
    config: Option<PathBuf>,
    /// Verbosity level (-v, -vv, -vvv); logs go to stderr
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_USAGE),
            };
            let _ = error.print();
            return code;
        }
    };
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let config = match load_runtime_config(&cli) {
        Ok(config) => config,
        Err(error) => {
            error!("{error:#}");
            eprintln!("error: {error:#}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match run(&cli.target, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error:#}");
            eprintln!("error: {error:#}");
            ExitCode::from(exit_code(&error))
        }
    }
}

/// Exit 2 when any cause in the chain is a client construction failure, else 1.
fn exit_code(error: &anyhow::Error) -> u8 {
    let unavailable = error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<EnrichError>(),
            Some(EnrichError::Construction(_))
        )
    });
    if unavailable {
        EXIT_CLIENT_UNAVAILABLE
    } else {
        EXIT_USAGE
    }
}

fn run(target: &str, config: &EnrichConfig) -> Result<()> {
    config
        .validate()
        .map_err(|error| EnrichError::Construction(format!("{error:#}")))?;
    let site = WikiSite::from_config(config)?;
    let transport = ReqwestTransport::new(&config.user_agent())?;
    let sleeper = ThreadSleeper;
    let fetcher = Fetcher::new(&transport, &sleeper);
    let wiki = MediaWikiClient::new(fetcher, &site, config.lookup_policy());

    let document = Enricher::new(config, &site, fetcher, &wiki).run(target);
    emit(&document)
}

fn emit(document: &MetadataDocument) -> Result<()> {
    let rendered = document.to_json().context("failed to serialize metadata")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}").context("failed to write metadata to stdout")?;
    stdout.flush().context("failed to flush stdout")?;
    Ok(())
}

fn load_runtime_config(cli: &Cli) -> Result<EnrichConfig> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    let path = resolve_config_path(cli.config.as_deref(), &cwd);
    load_config(&path)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: tracing subscriber already installed");
    }
}
