use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser};
use colored::*;
use manga2pdf::{ChapterOutcome, DownloadOptions, Downloader, GapPolicy, SiteConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "manga2pdf")]
#[command(about = "Fetch a manga chapter from the web and save it as a single PDF")]
#[command(version = "0.1.0")]
struct Args {
    /// The configuration file to use (JSON with `url` and `format`)
    config: PathBuf,

    /// The chapter to fetch
    chapter: u32,

    /// The output file
    #[arg(short = 'o', long = "output", default_value = "a.pdf")]
    output: PathBuf,

    /// How verbose to be (none for warnings only, -v for info, -vv for debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Request timeout in seconds (0 disables it)
    #[arg(short = 't', long = "timeout", default_value = "30.0", value_parser = parse_timeout)]
    timeout: Duration,

    /// Fail when a page is missing but one of the next LOOKAHEAD pages exists
    /// (`--strict` looks one page ahead, `--strict=N` looks N pages ahead)
    #[arg(
        long = "strict",
        value_name = "LOOKAHEAD",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "1"
    )]
    strict: Option<u32>,
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if value.is_nan() || value < 0.0 {
        return Err("Must be zero or positive number.".to_string());
    }
    Duration::try_from_secs_f64(value).map_err(|e| format!("Invalid timeout: {}", e))
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

fn init_logging(verbose: u8) {
    let level = log_level(verbose);
    let detailed = verbose > 1;

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(detailed)
                .with_file(detailed)
                .with_line_number(detailed),
        )
        .with(filter)
        .init();
}

async fn run(args: Args) -> Result<ChapterOutcome> {
    let config = SiteConfig::load(&args.config).await?;

    let options = DownloadOptions {
        timeout: args.timeout,
        gap_policy: match args.strict {
            Some(lookahead) => GapPolicy::Abort { lookahead },
            None => GapPolicy::Truncate,
        },
    };
    let downloader = Downloader::new(args.output, options);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current request");
            on_interrupt.cancel();
        }
    });

    downloader.run(&config, args.chapter, &cancel).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);
    debug!("Received args = {:?}", args);

    let chapter = args.chapter;
    match run(args).await {
        Ok(ChapterOutcome::Saved { pages, output }) => {
            info!(
                "Saved chapter {} ({} pages) to {}",
                chapter,
                pages,
                output.display().to_string().green()
            );
        }
        Ok(ChapterOutcome::NotFound) => {
            warn!("Chapter {} not found", chapter);
        }
        Ok(ChapterOutcome::Cancelled { .. }) => {
            process::exit(130);
        }
        Err(e) => {
            error!("{}", format!("Error: {:#}", e).red());
            process::exit(1);
        }
    }
}
