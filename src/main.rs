use clap::{Parser, Subcommand};
use feedwall::config::{self, FeedConfig};
use feedwall::feed::Feed;
use feedwall::probe::ImageProbe;
use feedwall::signing::SignedUrlCache;
use feedwall::{generate, output, scan};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the signing token when the config has none.
const TOKEN_ENV: &str = "FEEDWALL_SIGN_TOKEN";

/// How many columns to lay out with.
#[derive(clap::Args, Clone)]
struct ViewportArgs {
    /// Viewport width in pixels, mapped to a column count by the breakpoints
    #[arg(long, default_value_t = 1280, conflicts_with = "columns")]
    width: u32,

    /// Explicit column count, bypassing breakpoints
    #[arg(long)]
    columns: Option<usize>,
}

#[derive(Parser)]
#[command(name = "feedwall")]
#[command(about = "Waterfall feed layout and signed media URL resolution")]
#[command(long_about = "\
Waterfall feed layout and signed media URL resolution

Items are distributed across columns by aspect ratio. Once placed, an item
stays in its column unless that column grows more than the rebalance
threshold taller than the shortest one.

Media stored in a private bucket is resolved through a signing endpoint.
Requests for the same reference are shared, results are cached for a fixed
window, and at most `max_concurrent` signing calls run at once.

Typical flow:

  feedwall scan media/ --prefix images     # media/ → feed.json
  feedwall layout --width 1440             # print columns
  feedwall prefetch                        # warm signed URLs
  feedwall preview --output dist           # dist/index.html

Set RUST_LOG=feedwall=debug to see cache and signing activity.
Run 'feedwall gen-config' to generate a documented feedwall.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Feed manifest read and written by the commands
    #[arg(long, default_value = scan::MANIFEST_FILENAME, global = true)]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a media directory into a feed manifest
    Scan {
        /// Directory to scan
        dir: PathBuf,
        /// Key prefix prepended to every item source
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Lay out the manifest and print the columns
    Layout(ViewportArgs),
    /// Report whether references need a signed URL
    Classify {
        #[arg(required = true)]
        references: Vec<String>,
    },
    /// Resolve references to fetchable URLs
    Resolve {
        #[arg(required = true)]
        references: Vec<String>,
    },
    /// Resolve every source in the manifest
    Prefetch,
    /// Render the laid-out manifest to a static HTML page
    Preview {
        #[command(flatten)]
        viewport: ViewportArgs,
        /// Output directory
        #[arg(long, default_value = "dist")]
        output: PathBuf,
        /// Page title
        #[arg(long, default_value = "Feed")]
        title: String,
    },
    /// Print a stock feedwall.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = config::load_config(&cli.config)?;
    if config.signing.auth_token.is_none() {
        config.signing.auth_token = std::env::var(TOKEN_ENV).ok();
    }

    match cli.command {
        Command::Scan { dir, prefix } => {
            init_thread_pool(&config.processing);
            let report = scan::scan(&dir, prefix.as_deref(), &ImageProbe::new())?;
            scan::write_manifest(&cli.manifest, &report.manifest)?;
            output::print_scan_output(&report, &dir);
            tracing::info!(path = %cli.manifest.display(), "manifest written");
        }
        Command::Layout(viewport) => {
            let mut feed = load_feed(&cli.manifest, &config, &viewport)?;
            let items = feed.items().to_vec();
            let columns = feed.columns();
            let heights = column_heights(&columns);
            output::print_layout(&columns, &items, &heights);
        }
        Command::Classify { references } => {
            let cache = SignedUrlCache::from_config(&config.signing);
            let results: Vec<(String, bool)> = references
                .into_iter()
                .map(|r| {
                    let needs = cache.needs_signed_url(Some(&r));
                    (r, needs)
                })
                .collect();
            output::print_classification(&results);
        }
        Command::Resolve { references } => {
            let cache = SignedUrlCache::from_config(&config.signing);
            let results = runtime()?.block_on(async {
                let pending = references.iter().map(|r| cache.resolve(r));
                let resolved = futures::future::join_all(pending).await;
                references.iter().cloned().zip(resolved).collect::<Vec<_>>()
            });
            output::print_resolution(&results);
        }
        Command::Prefetch => {
            let manifest = scan::read_manifest(&cli.manifest)?;
            let cache = SignedUrlCache::from_config(&config.signing);
            let summary = runtime()?.block_on(
                cache.prefetch(manifest.items.iter().map(|i| Some(i.source.as_str()))),
            );
            output::print_prefetch(&summary, &cache.stats());
        }
        Command::Preview {
            viewport,
            output: output_dir,
            title,
        } => {
            let mut feed = load_feed(&cli.manifest, &config, &viewport)?;
            let cache = SignedUrlCache::from_config(&config.signing);
            let summary = runtime()?.block_on(generate::generate_preview(
                &mut feed,
                &cache,
                &title,
                &output_dir,
            ))?;
            output::print_preview(&summary);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn load_feed(
    manifest: &Path,
    config: &FeedConfig,
    viewport: &ViewportArgs,
) -> Result<Feed, Box<dyn std::error::Error>> {
    let manifest = scan::read_manifest(manifest)?;
    let mut feed = Feed::new(config.layout.clone());
    match viewport.columns {
        Some(columns) => feed.set_column_count(columns),
        None => feed.set_viewport_width(viewport.width),
    };
    feed.append(manifest.items);
    Ok(feed)
}

/// Summed height units per column, as the layout pass accounts them.
fn column_heights(columns: &[Vec<&feedwall::types::FeedItem>]) -> Vec<f64> {
    columns
        .iter()
        .map(|c| c.iter().map(|i| 1.0 / i.effective_aspect_ratio()).sum())
        .collect()
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
