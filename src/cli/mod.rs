use std::{path::PathBuf, rc::Rc};

use anyhow::Context;
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};

use crate::{
    config::{self, Verbosity},
    domain::normalize::Normalizer,
    pipeline::{self, RunSummary},
    reconcile::Reconciler,
    remote::playlist::load_tracks,
    reporter::{LogReporter, Reporter},
    storage::{index::IndexSource, integrity},
};

#[derive(Parser)]
#[command(name = "plsync")]
#[command(version = "0.1")]
#[command(about = "Keeps a local music folder in sync with a remote playlist")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "plsync.toml")]
    pub config: PathBuf,

    /// Log every similarity comparison
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download missing playlist tracks and repair corrupt files
    Sync,
    /// Show the local library index
    Index {
        /// Rescan the folder even if the cache is fresh
        #[arg(short, long)]
        refresh: bool,
    },
    /// List playlist tracks missing from the library without downloading
    Check,
    /// Find unreadable audio files in the library
    Verify {
        /// Delete corrupt files and download them again
        #[arg(short, long)]
        repair: bool,
    },
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::Config::load(&cli.config.to_string_lossy())
        .with_context(|| format!("failed to load config {}", cli.config.to_string_lossy()))?;
    if cli.verbose {
        cfg.output.verbosity = Verbosity::Debug;
    }
    init_logging(cfg.output.verbosity.is_debug());

    let reporter: Rc<dyn Reporter> = Rc::new(LogReporter);

    match &cli.command {
        Commands::Sync => {
            let pipeline = pipeline::build_live(&cfg, reporter.clone())?;
            let snapshot = pipeline.index().build();

            let normalizer = Normalizer::new(&cfg.matching.noise_phrase);
            let source = pipeline::playlist_source(&cfg.playlist);
            let tracks = load_tracks(source.as_ref(), &normalizer, reporter.as_ref());
            if tracks.is_empty() {
                println!("No playlist tracks to reconcile");
                return Ok(());
            }

            let summary = pipeline.execute(&tracks, &snapshot.keys)?;
            print_summary(&summary, &cfg.output.failure_report);
        }

        Commands::Index { refresh } => {
            let index = pipeline::local_index(&cfg, reporter.clone());
            let snapshot = if *refresh { index.refresh() } else { index.build() };

            println!(
                "Library {} contains {} track keys",
                index.folder().to_string_lossy(),
                snapshot.keys.len()
            );
            match snapshot.source {
                IndexSource::CreatedFolder => println!("Library folder did not exist and was created"),
                IndexSource::Cache { written_at } => println!(
                    "Loaded from cache written {}",
                    DateTime::<Local>::from(written_at).format("%Y-%m-%d %H:%M:%S")
                ),
                IndexSource::Scan { files } => println!("Scanned {files} audio files"),
            }
        }

        Commands::Check => {
            let index = pipeline::local_index(&cfg, reporter.clone());
            let snapshot = index.build();

            let normalizer = Normalizer::new(&cfg.matching.noise_phrase);
            let source = pipeline::playlist_source(&cfg.playlist);
            let tracks = load_tracks(source.as_ref(), &normalizer, reporter.as_ref());

            let reconciliation = Reconciler::new(cfg.matching.initial_threshold, reporter.clone())
                .with_trace(cfg.output.verbosity.is_debug())
                .reconcile(&tracks, &snapshot.keys);

            println!(
                "{} of {} playlist tracks are in the library, {} missing:",
                reconciliation.present.len(),
                tracks.len(),
                reconciliation.missing.len()
            );
            for track in &reconciliation.missing {
                println!("    - {}", track.label());
            }
        }

        Commands::Verify { repair } => {
            if *repair {
                let pipeline = pipeline::build_live(&cfg, reporter.clone())?;
                let summary = pipeline.verify_and_repair();
                println!(
                    "Found {} corrupt files, downloaded again: {}, not recovered: {}",
                    summary.corrupt, summary.redownloaded, summary.not_recovered
                );
            } else {
                let corrupt = integrity::verify_folder(&cfg.library.tracks_dir(), reporter.as_ref());
                if corrupt.is_empty() {
                    println!("No corrupt files found");
                }
                for record in &corrupt {
                    println!("  [CORRUPT]  {}", record.path.to_string_lossy());
                }
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, failure_report: &std::path::Path) {
    let rounds = &summary.rounds;
    println!("Playlist tracks: {}", rounds.total);
    println!("  already present: {}", rounds.present);
    println!("  downloaded: {}", rounds.downloaded);
    if !rounds.recovered_on_recheck.is_empty() {
        println!("  found on recheck: {}", rounds.recovered_on_recheck.len());
    }
    if let Some(repair) = &summary.repair {
        println!(
            "  corrupt files: {} (downloaded again: {})",
            repair.corrupt, repair.redownloaded
        );
    }
    if summary.report_written {
        println!(
            "  failed: {}, listed in {}",
            rounds.failed.len(),
            failure_report.to_string_lossy()
        );
        for track in &rounds.failed {
            println!("    - {}", track.label());
        }
    } else {
        println!("Everything is in sync");
    }
}
