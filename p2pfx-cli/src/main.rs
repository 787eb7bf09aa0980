//! p2pfx CLI: sync, status and export commands.
//!
//! Commands:
//! - `sync`: run one sync cycle for the selected sources
//! - `status`: report metadata, master row counts and partitions per source
//! - `export`: write a source's master dataset to CSV

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use p2pfx_core::domain::SourceId;
use p2pfx_runner::{
    export_master_csv, live_sources, run_sync, source_status, MasterState, MetadataState,
    StorageLayout, SyncConfig,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "p2pfx.toml";

#[derive(Parser)]
#[command(name = "p2pfx", about = "p2pfx: incremental sync of P2P and official exchange rates")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    All,
    P2p,
    Official,
}

impl SourceArg {
    fn selected(self) -> Vec<SourceId> {
        match self {
            SourceArg::All => SourceId::ALL.to_vec(),
            SourceArg::P2p => vec![SourceId::P2p],
            SourceArg::Official => vec![SourceId::Official],
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, normalize and merge new data for the selected sources.
    Sync {
        /// TOML config file. Defaults to ./p2pfx.toml when present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the config's data root.
        #[arg(long)]
        data_root: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = SourceArg::All)]
        source: SourceArg,

        /// Print the run report as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show what is stored for each source.
    Status {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_root: Option<PathBuf>,
    },
    /// Export a source's master dataset to CSV.
    Export {
        /// `p2p` or `official`.
        #[arg(long)]
        source: SourceId,

        /// Destination CSV file.
        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_root: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Sync {
            config,
            data_root,
            source,
            json,
        } => run_sync_cmd(config.as_deref(), data_root, source, json),
        Commands::Status { config, data_root } => run_status(config.as_deref(), data_root),
        Commands::Export {
            source,
            out,
            config,
            data_root,
        } => run_export(config.as_deref(), data_root, source, &out),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, data_root: Option<PathBuf>) -> Result<SyncConfig> {
    let mut config = match path {
        Some(path) => SyncConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => SyncConfig::from_file(Path::new(DEFAULT_CONFIG))?,
        None => SyncConfig::default(),
    };
    if let Some(root) = data_root {
        config.data_root = root;
    }
    config.validate()?;
    Ok(config)
}

fn run_sync_cmd(config_path: Option<&Path>, data_root: Option<PathBuf>, source: SourceArg, json: bool) -> Result<()> {
    let config = load_config(config_path, data_root)?;
    let sources = live_sources(&config, &source.selected()).context("failed to set up HTTP client")?;
    if sources.is_empty() {
        bail!("no source selected: every requested source is disabled in the config");
    }

    let report = run_sync(&config, &sources);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        print!("{}", report.render_table());
        println!();
        println!("Data root: {}", config.data_root.display());
    }

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_status(config_path: Option<&Path>, data_root: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, data_root)?;
    let layout = StorageLayout::new(&config.data_root);

    println!("Data root: {}", layout.root().display());
    println!();
    println!(
        "{:<10} {:>6} {:>12} {:>10} {:>12} {:>12} {:>5} {:>7} {:>6}",
        "SOURCE", "RUN", "LAST DATE", "ROWS", "FIRST", "LAST", "RAW", "HISTORY", "DAILY"
    );
    println!("{}", "-".repeat(90));

    for source in SourceId::ALL {
        let status = source_status(&layout, source)?;

        let (run, last_date) = match &status.metadata {
            MetadataState::Absent => ("-".to_string(), "never".to_string()),
            MetadataState::Loaded {
                run_index,
                last_processed,
            } => (
                run_index.to_string(),
                last_processed.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            ),
            MetadataState::Corrupt(_) => ("?".to_string(), "corrupt".to_string()),
        };

        let (rows, first, last) = match &status.master {
            MasterState::Missing => ("-".to_string(), "-".to_string(), "-".to_string()),
            MasterState::Rows { rows, first, last } => (
                rows.to_string(),
                first.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                last.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            ),
            MasterState::Unreadable(_) => ("unreadable".to_string(), "-".to_string(), "-".to_string()),
        };

        println!(
            "{:<10} {:>6} {:>12} {:>10} {:>12} {:>12} {:>5} {:>7} {:>6}",
            source.as_str(),
            run,
            last_date,
            rows,
            first,
            last,
            status.raw_captures,
            status.history_partitions,
            status.daily_partitions
        );

        if let MetadataState::Corrupt(reason) = &status.metadata {
            println!("  metadata: {reason}");
        }
        if let MasterState::Unreadable(reason) = &status.master {
            println!("  master: {reason}");
        }
    }

    Ok(())
}

fn run_export(config_path: Option<&Path>, data_root: Option<PathBuf>, source: SourceId, out: &Path) -> Result<()> {
    let config = load_config(config_path, data_root)?;
    let layout = StorageLayout::new(&config.data_root);
    let rows = export_master_csv(&layout, source, out)?;
    println!("Exported {rows} {source} rows to {}", out.display());
    Ok(())
}
