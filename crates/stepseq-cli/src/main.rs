//! stepseq: terminal step sequencer

mod config;
mod grid;
mod session;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, RecvTimeoutError};
use stepseq_core::{codec, Catalog, PatternDefaults, PatternStore};
use stepseq_services::{
    asset_root, load_catalog, render_to_wav, AudioGraph, LogPlayback, Playback, RenderOptions, Scheduler,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{config_path, load_config, AppConfig, DEFAULT_LOG_FILTER};
use session::Session;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "stepseq", about = "Step sequencer for sample catalogs", version)]
struct Cli {
    /// Catalog document, as a file path or http(s) URL
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// Config file [default: ~/.config/stepseq/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory sample files resolve against [default: the catalog's directory]
    #[arg(long, global = true)]
    assets: Option<PathBuf>,

    /// Log triggers instead of opening an audio device
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Loop a pattern file until Ctrl-C
    Play {
        pattern: PathBuf,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,

        /// Override the pattern tempo
        #[arg(long)]
        bpm: Option<u32>,
    },
    /// Validate a pattern file and print its grid
    Check { pattern: PathBuf },
    /// Bounce a pattern file to a WAV file
    Render {
        pattern: PathBuf,

        /// WAV file to write
        #[arg(short, long, default_value = "pattern.wav")]
        out: PathBuf,

        /// Times the loop is played
        #[arg(long, default_value_t = 1)]
        loops: u32,

        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
    },
    /// List the catalog entries
    Catalog,
    /// Edit interactively, one command per line on stdin
    Session {
        /// Pattern to start from
        pattern: Option<PathBuf>,
    },
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Where triggers go for this run. The graph, when present, must outlive
/// every scheduler holding `playback`.
struct Output {
    graph: Option<AudioGraph>,
    playback: Arc<dyn Playback>,
}

impl Output {
    fn open(assets: PathBuf, catalog: &Catalog, dry_run: bool) -> Self {
        if dry_run {
            return Self::dry_run();
        }
        match AudioGraph::open(assets) {
            Ok(graph) => {
                graph.preload(catalog);
                let playback: Arc<dyn Playback> = Arc::new(graph.player());
                Self {
                    graph: Some(graph),
                    playback,
                }
            }
            Err(e) => {
                warn!("No audio output, logging triggers instead: {}", e);
                Self::dry_run()
            }
        }
    }

    fn dry_run() -> Self {
        Self {
            graph: None,
            playback: Arc::new(LogPlayback),
        }
    }

    fn shutdown(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.shutdown();
        }
    }
}

fn load_pattern(path: &Path, defaults: PatternDefaults) -> Result<PatternStore> {
    let pattern = codec::import_from_path(path, defaults)
        .with_context(|| format!("Failed to load pattern {}", path.display()))?;
    info!(
        path = %path.display(),
        bpm = pattern.bpm(),
        steps = pattern.total_steps(),
        notes = pattern.len(),
        "Pattern loaded"
    );
    Ok(PatternStore::with_pattern(pattern, defaults))
}

fn warn_unknown_names(store: &PatternStore, catalog: &Catalog) {
    if catalog.is_empty() {
        return;
    }
    let pattern = store.snapshot();
    let mut unknown: Vec<&str> = pattern
        .placements()
        .iter()
        .map(|p| p.name.as_str())
        .filter(|name| !catalog.contains(name))
        .collect();
    unknown.sort_unstable();
    unknown.dedup();
    for name in unknown {
        warn!(name, "Pattern note has no catalog entry and will be silent");
    }
}

fn play(cli: &Cli, config: &AppConfig, path: &Path, ticks: Option<u64>, bpm: Option<u32>) -> Result<()> {
    let source = config.catalog_source(cli.catalog.as_deref());
    let store = Arc::new(load_pattern(path, config.pattern_defaults())?);
    if let Some(bpm) = bpm {
        store.set_bpm(bpm);
    }
    let catalog = load_catalog(&source);
    warn_unknown_names(&store, &catalog);

    let assets = asset_root(&source, config.asset_override(cli.assets.as_deref()));
    let mut output = Output::open(assets, &catalog, cli.dry_run);
    let mut scheduler = Scheduler::new(store, Arc::new(catalog), output.playback.clone());

    let (stop_tx, stop_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    scheduler.play();
    loop {
        match stop_rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if ticks.is_some_and(|n| scheduler.transport().ticks() >= n) {
            break;
        }
    }

    scheduler.shutdown();
    output.shutdown();
    info!(ticks = scheduler.transport().ticks(), "Playback finished");
    Ok(())
}

fn check(cli: &Cli, config: &AppConfig, path: &Path) -> Result<()> {
    let store = load_pattern(path, config.pattern_defaults())?;
    let catalog = match cli.catalog.as_deref().or(config.catalog.source.as_deref()) {
        Some(source) => load_catalog(source),
        None => Catalog::empty(),
    };
    warn_unknown_names(&store, &catalog);
    print!("{}", grid::render(&store.snapshot(), &catalog, None));
    Ok(())
}

fn render(cli: &Cli, config: &AppConfig, path: &Path, out: &Path, options: RenderOptions) -> Result<()> {
    let source = config.catalog_source(cli.catalog.as_deref());
    let store = load_pattern(path, config.pattern_defaults())?;
    let catalog = load_catalog(&source);
    warn_unknown_names(&store, &catalog);

    let assets = asset_root(&source, config.asset_override(cli.assets.as_deref()));
    let summary = render_to_wav(&store.snapshot(), &catalog, assets, options, out)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "wrote {} ({} frames, {} hits, {} skipped)",
        out.display(),
        summary.frames,
        summary.triggers,
        summary.skipped
    );
    Ok(())
}

fn list_catalog(cli: &Cli, config: &AppConfig) -> Result<()> {
    let source = config.catalog_source(cli.catalog.as_deref());
    let catalog = load_catalog(&source);
    if catalog.is_empty() {
        println!("catalog {source} has no entries");
        return Ok(());
    }
    let width = catalog.entries().iter().map(|e| e.name.len()).max().unwrap_or(0);
    for entry in catalog.entries() {
        match &entry.color {
            Some(color) => println!("{:width$}  {}  {}", entry.name, entry.file, color),
            None => println!("{:width$}  {}", entry.name, entry.file),
        }
    }
    Ok(())
}

fn run_session(cli: &Cli, config: &AppConfig, path: Option<&Path>) -> Result<()> {
    let source = config.catalog_source(cli.catalog.as_deref());
    let defaults = config.pattern_defaults();
    let store = match path {
        Some(path) => load_pattern(path, defaults)?,
        None => PatternStore::new(defaults),
    };
    let catalog = load_catalog(&source);

    let assets = asset_root(&source, config.asset_override(cli.assets.as_deref()));
    let mut output = Output::open(assets, &catalog, cli.dry_run);
    let scheduler = Scheduler::new(Arc::new(store), Arc::new(catalog), output.playback.clone());
    let mut session = Session::new(scheduler);

    session.run(io::stdin().lock(), &mut io::stdout())?;
    drop(session);
    output.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config.clone().unwrap_or_else(config_path));
    init_logging(&config.logging.filter);

    match &cli.command {
        Commands::Play { pattern, ticks, bpm } => play(&cli, &config, pattern, *ticks, *bpm),
        Commands::Check { pattern } => check(&cli, &config, pattern),
        Commands::Render {
            pattern,
            out,
            loops,
            sample_rate,
        } => {
            let options = RenderOptions {
                sample_rate: *sample_rate,
                loops: *loops,
            };
            render(&cli, &config, pattern, out, options)
        }
        Commands::Catalog => list_catalog(&cli, &config),
        Commands::Session { pattern } => run_session(&cli, &config, pattern.as_deref()),
    }
}
