//! CLI entry point: parse flags, resolve settings against an optional
//! config file, build the configured sink, and run one crawl.
//!
//! Grounded in `crawler_cli.py`: flag set, config-overrides-CLI
//! precedence, and the "print a summary once crawling finishes" shape.
//! The `tqdm` progress bar becomes an `indicatif` spinner; the
//! `stats_exporter` HTML/JSON export named there is out of scope here
//! (see SPEC_FULL.md's Non-goals).

use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use async_crawler::{CliArgs, CrawlerError, CrawlerSettings, Orchestrator};

fn init_logging(settings: &CrawlerSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_level.to_lowercase()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &settings.log_file {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("crawler.log"));
            let (non_blocking, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::never(dir, file_name),
            );
            // Leaked deliberately: the guard must outlive the subscriber,
            // and the subscriber lives for the process.
            Box::leak(Box::new(guard));
            builder.with_writer(non_blocking).init();
        }
        None => builder.init(),
    }
}

async fn run() -> Result<(), CrawlerError> {
    let args = CliArgs::parse();
    let settings = CrawlerSettings::resolve(&args)?;
    init_logging(&settings);

    tracing::info!(urls = ?settings.start_urls, max_pages = settings.max_pages, "starting crawl");

    let sink = async_crawler::sinks::build_sink(&settings.storage).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {elapsed_precise} crawling... {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let orchestrator = Orchestrator::new(settings, sink)?;
    let summary = orchestrator.run().await;

    spinner.finish_with_message(format!(
        "processed {} pages ({} failed, {} blocked by robots.txt)",
        summary.processed, summary.failed, summary.blocked_by_robots
    ));

    println!(
        "Crawl finished: {} processed, {} failed, {} blocked by robots.txt.",
        summary.processed, summary.failed, summary.blocked_by_robots
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
