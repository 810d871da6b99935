use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tsundoku_epub::images::{HttpFetcher, inline_images_in_html};
use tsundoku_epub::queue::{ArticleSource, JsonQueue};
use tsundoku_epub::{config, epub, naming, output};

fn version_string() -> &'static str {
    let hash = env!("TSUNDOKU_GIT_HASH");
    if hash.is_empty() {
        env!("CARGO_PKG_VERSION")
    } else {
        let dirty = if env!("TSUNDOKU_GIT_DIRTY") == "true" { "-dirty" } else { "" };
        // Leaked once at startup
        Box::leak(format!("{} ({hash}{dirty})", env!("CARGO_PKG_VERSION")).into_boxed_str())
    }
}

#[derive(Parser)]
#[command(name = "tsundoku-epub")]
#[command(about = "Export saved web articles as an offline EPUB book")]
#[command(long_about = "\
Export saved web articles as an offline EPUB book

Reads a JSON export of saved articles, either an array of items or an
object with an \"items\" array, and writes one EPUB 3 book: a generated
cover, a table of contents, and one chapter per article with its images
downloaded and packaged inside.

Item fields (all optional):
  id, url, title, byline, site, tagline, excerpt
  created_at, published_at, modified_at   ISO 8601 timestamps
  content_html, content_text              HTML wins; text is the fallback
  queue_id                                missing means \"default\"
  order                                   position within the queue

Settings are read from config.toml in the --config directory; flags win.
Run 'tsundoku-epub gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory containing config.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    /// Log more (repeat for trace output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

/// Which articles to read.
#[derive(clap::Args, Clone)]
struct QueueArgs {
    /// JSON file of saved articles
    items: PathBuf,

    /// Only export this queue (items without one are in "default")
    #[arg(long)]
    queue: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Build an EPUB from saved articles
    Export {
        #[command(flatten)]
        source: QueueArgs,

        /// Book title
        #[arg(long)]
        title: Option<String>,

        /// Book author
        #[arg(long)]
        creator: Option<String>,

        /// Export date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,

        /// Seed for the cover palette
        #[arg(long)]
        seed: Option<u64>,

        /// Leave images remote instead of downloading them
        #[arg(long)]
        no_images: bool,

        /// Output file (default: <title>-<date>.epub in the current directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Replace every image in an HTML file with a data: URL
    Inline {
        /// HTML file to rewrite
        file: PathBuf,

        /// URL the HTML was saved from, for resolving relative image paths
        #[arg(long)]
        base_url: String,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List the articles an export would include, without building it
    Check {
        #[command(flatten)]
        source: QueueArgs,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Export {
            source,
            title,
            creator,
            date,
            seed,
            no_images,
            output: output_path,
        } => {
            let settings = config::load_config(&cli.config)?;
            let items = JsonQueue::new(&source.items).list(source.queue.as_deref())?;

            let mut options = settings.export_options();
            if let Some(title) = title {
                options.title = title;
            }
            if let Some(creator) = creator {
                options.creator = creator;
            }
            options.exported_at = date;
            if seed.is_some() {
                options.cover_seed = seed;
            }
            if no_images {
                options.embed_images = false;
            }

            let fetcher = HttpFetcher::new(&settings.http_options())?;
            let exported = epub::export_epub(&items, &options, &fetcher)?;

            let path = output_path.unwrap_or_else(|| {
                let meta = &exported.report.metadata;
                PathBuf::from(naming::epub_filename(&meta.title, &meta.export_date))
            });
            std::fs::write(&path, &exported.bytes)?;
            output::print_export_output(&exported, &path);
        }
        Command::Inline {
            file,
            base_url,
            output: output_path,
        } => {
            let settings = config::load_config(&cli.config)?;
            let html = std::fs::read_to_string(&file)?;
            let fetcher = HttpFetcher::new(&settings.http_options())?;
            let inlined = inline_images_in_html(&html, &base_url, &fetcher);
            match output_path {
                Some(path) => std::fs::write(path, inlined)?,
                None => print!("{inlined}"),
            }
        }
        Command::Check { source } => {
            let items = JsonQueue::new(&source.items).list(source.queue.as_deref())?;
            output::print_check_output(&items, source.queue.as_deref());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. Default level is `warn`, so a plain
/// export only reports absorbed failures.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
