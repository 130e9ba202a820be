//! spooltag CLI
//!
//! Decode decrypted tag dumps and derive sector keys from the command line

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spooltag_rs::core::keys::parse_uid;
use spooltag_rs::{
    BambuKeyDerivation, CachedKeyDerivation, CatalogSource, Config, DecryptedScanData,
    EmptyCatalog, FileStore, InterpreterFactory, KeyDerivation, StaticCatalog,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "spooltag")]
#[command(about = "Filament spool RFID key derivation and tag decoding")]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a decrypted scan dump (JSON) into filament metadata
    Decode {
        /// Path to the dump
        dump: PathBuf,

        /// Product/mapping catalog (JSON)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Derive the sector keys for a tag UID
    Keys {
        /// Tag UID in hex (separators ':', '-' and ' ' are ignored)
        uid: String,

        /// Directory for the persistent key cache
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Derive the B-key set instead of the A-key set
        #[arg(long)]
        key_b: bool,
    },

    /// List the registered tag interpreters
    Formats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Decode {
            dump,
            catalog,
            pretty,
        } => decode(&config, &dump, catalog.as_deref(), pretty),
        Command::Keys {
            uid,
            cache_dir,
            key_b,
        } => keys(&config, &uid, cache_dir.as_deref(), key_b),
        Command::Formats => {
            let factory = InterpreterFactory::with_defaults();
            for (format, name) in factory
                .supported_formats()
                .iter()
                .zip(factory.supported_interpreter_names())
            {
                println!("{:<10} {}", format.as_str(), name);
            }
            Ok(())
        }
    }
}

fn decode(config: &Config, dump: &Path, catalog: Option<&Path>, pretty: bool) -> Result<()> {
    let raw = std::fs::read_to_string(dump)
        .with_context(|| format!("failed to read dump {}", dump.display()))?;
    let data: DecryptedScanData =
        serde_json::from_str(&raw).context("dump is not a decrypted scan record")?;

    let source: Arc<dyn CatalogSource> = match catalog {
        Some(path) => {
            let catalog = StaticCatalog::load(path)
                .with_context(|| format!("failed to load catalog {}", path.display()))?;
            info!(
                "Loaded catalog: {} mappings, {} products",
                catalog.mappings.len(),
                catalog.products.len()
            );
            Arc::new(catalog)
        }
        None => Arc::new(EmptyCatalog),
    };

    let factory = InterpreterFactory::new(source, config.interpreter.clone());
    let Some(info) = factory.interpret(&data) else {
        bail!(
            "no interpreter recognized tag {} (format {}, {} blocks)",
            data.tag_uid,
            data.tag_format,
            data.decrypted_blocks.len()
        );
    };

    let out = if pretty {
        serde_json::to_string_pretty(&info)?
    } else {
        serde_json::to_string(&info)?
    };
    println!("{}", out);
    Ok(())
}

fn keys(config: &Config, uid: &str, cache_dir: Option<&Path>, key_b: bool) -> Result<()> {
    let uid = parse_uid(uid)?;
    let engine: Arc<dyn KeyDerivation> = if key_b {
        Arc::new(BambuKeyDerivation::key_b())
    } else {
        Arc::new(BambuKeyDerivation::new())
    };

    let facade = CachedKeyDerivation::new(engine, config.cache.clone());
    if let Some(dir) = cache_dir {
        let store = FileStore::open(dir)
            .with_context(|| format!("failed to open cache dir {}", dir.display()))?;
        facade.initialize(Arc::new(store));
    }

    let keys = facade.derive_keys(&uid);
    if keys.is_empty() {
        bail!("key derivation produced no keys");
    }
    for (sector, key) in keys.iter().enumerate() {
        println!("{:2} {}", sector, key);
    }

    if let Some(stats) = facade.statistics() {
        info!(
            "Key cache: {} memory hits, {} persistent hits, {} misses",
            stats.memory_hits, stats.persistent_hits, stats.misses
        );
    }
    facade.shutdown();
    Ok(())
}
