mod browser;
mod error;
mod extract;
mod feed;
mod html;
mod links;
mod pipeline;
mod server;
mod settings;
mod store;
mod summary;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, warn};

use browser::ChromiumSource;
use feed::FeedClient;
use pipeline::{Pipeline, RunStats};
use settings::Settings;
use store::{ObjectStore, S3Store};

#[derive(Parser)]
#[command(name = "ipo_scraper", about = "IPO detail page scraper and live summary server")]
struct Cli {
    /// Settings file (default: ./ipo_scraper.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect detail links from the feed and write the manifest
    Links,
    /// Collect links, then scrape, clean, store and upload each detail page
    Extract {
        /// Max pages to process (default from settings: 100)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Reuse the existing manifest instead of querying the feed
        #[arg(long)]
        from_manifest: bool,
    },
    /// Render the live summary page once
    Summary {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve the health check, /scrape and the artifact folder
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        /// Do not start an extraction run in the background
        #[arg(long)]
        no_extract: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Links => {
            let feed = FeedClient::new(settings.feed.clone());
            let entries = links::collect_links(&feed, &settings.feed.extract_set()).await;
            if entries.is_empty() {
                println!("No hyperlinks found.");
                return Ok(());
            }
            links::write_manifest(&settings.manifest_path, &entries)?;
            println!(
                "Saved {} links to {}",
                entries.len(),
                settings.manifest_path.display()
            );
            Ok(())
        }
        Commands::Extract {
            limit,
            from_manifest,
        } => {
            if let Some(n) = limit {
                settings.limit = n;
            }
            let stats = if from_manifest {
                let entries = links::read_manifest(&settings.manifest_path)
                    .context("no manifest; run 'links' first")?;
                run_extraction(&settings, Some(entries)).await?
            } else {
                run_extraction(&settings, None).await?
            };
            print_stats(&stats);
            Ok(())
        }
        Commands::Summary { output } => {
            let feed = FeedClient::new(settings.feed.clone());
            let page = summary::SummaryRenderer::new(&settings.server.summary_link_base)
                .render(
                    &feed,
                    &settings.feed.summary_set(),
                    chrono::Local::now().date_naive(),
                )
                .await;
            match output {
                Some(path) => {
                    std::fs::write(&path, page)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Summary written to {}", path.display());
                }
                None => println!("{page}"),
            }
            Ok(())
        }
        Commands::Serve { port, no_extract } => {
            if let Some(p) = port {
                settings.server.port = p;
            }
            if no_extract {
                settings.server.extract_on_start = false;
            }
            if settings.server.extract_on_start {
                let background = settings.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_extraction(&background, None).await {
                        error!("Background extraction failed: {:#}", e);
                    }
                });
            }
            server::serve(Arc::new(server::AppState::new(settings))).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// One extraction run: from `entries` when given, otherwise from the feed.
async fn run_extraction(
    settings: &Settings,
    entries: Option<Vec<links::LinkEntry>>,
) -> anyhow::Result<RunStats> {
    let pages = ChromiumSource::new(settings.browser.clone());
    let store = if settings.storage.is_configured() {
        match S3Store::from_settings(&settings.storage) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Uploads disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let pipeline = Pipeline::new(
        settings,
        &pages,
        store.as_ref().map(|s| s as &dyn ObjectStore),
    );
    match entries {
        Some(entries) => pipeline.extract_all(&entries).await,
        None => pipeline.run(&FeedClient::new(settings.feed.clone())).await,
    }
}

fn print_stats(stats: &RunStats) {
    println!(
        "Done: {} pages ({} written, {} empty, {} failed); {} uploaded, {} upload errors.",
        stats.total, stats.written, stats.empty, stats.failed, stats.uploaded, stats.upload_errors
    );
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
