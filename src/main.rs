use clap::{Parser, Subcommand};
use page_transfer::assets::AssetStore;
use page_transfer::config::{self, DEFAULT_CONFIG_FILE, TransferConfig};
use page_transfer::fetch::HttpFetcher;
use page_transfer::materialize::Materializer;
use page_transfer::store::JsonDirStore;
use page_transfer::transfer::{self, ImportOptions};
use page_transfer::{invalidate, output};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "page-transfer")]
#[command(about = "Move page-builder content between sites, media included")]
#[command(long_about = "\
Move page-builder content between sites, media included

Export writes every metadata field of a content item to a JSON bundle.
Import reads a bundle, downloads each media file it references from the
source site into the local asset directory, rewrites the URLs to point
there, and writes the fields back.

  page-transfer export 42                       # → elementor-content-42.json
  page-transfer inspect elementor-content-42.json
  page-transfer import 7 elementor-content-42.json --dry-run
  page-transfer import 7 elementor-content-42.json

Assets are stored at a path derived from the source URL plus a short
fingerprint, so importing the same bundle twice downloads nothing new.
Assets that cannot be downloaded keep their original URL.

Run 'page-transfer gen-config' to generate a documented page-transfer.toml.
Set RUST_LOG=debug for per-URL decisions.")]
#[command(version)]
struct Cli {
    /// Config file (defaults apply when page-transfer.toml is absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a content item's fields to a JSON bundle
    Export {
        /// Content id
        id: String,
        /// Bundle file (default: elementor-content-<id>.json)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Import a JSON bundle into a content item, localizing its assets
    Import {
        /// Content id to import into
        id: String,
        /// Bundle file
        file: PathBuf,
        /// Report what would be fetched and rewritten without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show each field's encoding and the asset URLs it references
    Inspect {
        /// Bundle file
        file: PathBuf,
    },
    /// Print a stock page-transfer.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Export { id, output: out } => {
            let config = load(cli.config.as_deref())?;
            let store = JsonDirStore::new(&config.store.dir);
            let bundle = transfer::export(&store, &id, &config.export.prefixes)?;
            let path = out.unwrap_or_else(|| PathBuf::from(transfer::default_export_name(&id)));
            transfer::write_bundle(&bundle, &path)?;
            output::print_export_summary(&id, &bundle, &path);
        }
        Command::Import { id, file, dry_run } => {
            let config = load(cli.config.as_deref())?;
            let bundle = transfer::read_bundle(&file)?;

            let assets = AssetStore::new(&config.assets.base_dir, &config.assets.base_url)?;
            let fetcher = HttpFetcher::from_config(&config.fetch)?;
            let types = config.mime.types();
            let mut materializer =
                Materializer::new(&assets, &fetcher, &types, &config.assets.source_prefix)
                    .dry_run(dry_run);
            let mut store = JsonDirStore::new(&config.store.dir);
            let invalidator = invalidate::from_config(&config.import.after_import);

            let report = transfer::import(
                bundle,
                &id,
                &mut store,
                &mut materializer,
                invalidator.as_ref(),
                &ImportOptions::from(&config.import),
            )?;
            output::print_import_report(&report);
        }
        Command::Inspect { file } => {
            let config = load(cli.config.as_deref())?;
            let bundle = transfer::read_bundle(&file)?;
            let fields =
                transfer::inspect(&bundle, &config.mime.types(), &config.import.layout_field);
            output::print_inspect(&fields);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config named on the command line, or `page-transfer.toml` in the
/// working directory if it exists.
fn load(explicit: Option<&Path>) -> Result<TransferConfig, config::ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    debug!("Loading config from {}", path.display());
    config::load_config(path, required)
}
