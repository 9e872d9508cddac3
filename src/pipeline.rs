//! One reconciliation run: initial pass, two bounded download rounds with a lenient
//! recheck in between, integrity repair and the terminal failure report.

use std::{path::PathBuf, rc::Rc};

use anyhow::Context;

use crate::{
    config::{self, Config},
    domain::{normalize::Normalizer, track::RemoteTrackRef},
    download::{
        Downloader, TrackResolver,
        orchestrator::Orchestrator,
        runner::ProcessRunner,
        tool::{DownloaderTool, resolve_executable},
    },
    pacing::{Sleeper, ThreadSleeper},
    reconcile::{Reconciler, Reconciliation},
    remote::{
        catalog::{CatalogClient, SearchSettings, fetch_access_token},
        http::UreqTransport,
        playlist::{FilePlaylist, PlaylistSource, YtMusicPlaylist},
    },
    reporter::Reporter,
    storage::{
        error::StorageError,
        index::{LocalIndex, LocalKeys},
        integrity,
        report::write_failure_report,
    },
};

/// Retry escalation states, visited in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InitialPass,
    DownloadRound1,
    RecheckAgainstRefreshedLibrary,
    DownloadRound2,
    Terminal,
}

#[derive(Debug, Default)]
pub struct RoundsOutcome {
    pub total: usize,
    pub present: usize,
    pub downloaded: usize,
    /// failed in round 1 but found locally by the lenient recheck
    pub recovered_on_recheck: Vec<RemoteTrackRef>,
    /// still missing after round 2, in playlist order
    pub failed: Vec<RemoteTrackRef>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub corrupt: usize,
    pub redownloaded: usize,
    pub not_recovered: usize,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub rounds: RoundsOutcome,
    pub repair: Option<RepairSummary>,
    pub report_written: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub initial_threshold: f64,
    pub retry_threshold: f64,
    pub trace: bool,
    pub integrity_check: bool,
    pub failure_report: PathBuf,
}

impl PipelineOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            initial_threshold: cfg.matching.initial_threshold,
            retry_threshold: cfg.matching.retry_threshold,
            trace: cfg.output.verbosity.is_debug(),
            integrity_check: cfg.library.integrity_check,
            failure_report: cfg.output.failure_report.clone(),
        }
    }
}

pub struct Pipeline<C: TrackResolver, D: Downloader, S: Sleeper> {
    index: LocalIndex,
    orchestrator: Orchestrator<C, D, S>,
    initial: Reconciler,
    retry: Reconciler,
    integrity_check: bool,
    failure_report: PathBuf,
    reporter: Rc<dyn Reporter>,
}

impl<C: TrackResolver, D: Downloader, S: Sleeper> Pipeline<C, D, S> {
    pub fn new(
        index: LocalIndex,
        orchestrator: Orchestrator<C, D, S>,
        options: PipelineOptions,
        reporter: Rc<dyn Reporter>,
    ) -> Self {
        Self {
            index,
            orchestrator,
            initial: Reconciler::new(options.initial_threshold, reporter.clone())
                .with_trace(options.trace),
            retry: Reconciler::new(options.retry_threshold, reporter.clone())
                .with_trace(options.trace),
            integrity_check: options.integrity_check,
            failure_report: options.failure_report,
            reporter,
        }
    }

    pub fn index(&self) -> &LocalIndex {
        &self.index
    }

    /// Drives the escalation state machine from the initial pass to terminal.
    pub fn run_rounds(&self, tracks: &[RemoteTrackRef], local: &LocalKeys) -> RoundsOutcome {
        let mut outcome = RoundsOutcome {
            total: tracks.len(),
            ..Default::default()
        };
        let mut pending: Vec<RemoteTrackRef> = Vec::new();
        let mut stage = Stage::InitialPass;

        while stage != Stage::Terminal {
            self.reporter.debug(&format!("stage: {stage:?}"));
            stage = match stage {
                Stage::InitialPass => {
                    let Reconciliation { present, missing } = self.initial.reconcile(tracks, local);
                    outcome.present = present.len();
                    pending = missing;
                    if pending.is_empty() {
                        self.reporter.info("every playlist track is already in the library");
                        Stage::Terminal
                    } else {
                        Stage::DownloadRound1
                    }
                }
                Stage::DownloadRound1 => {
                    self.reporter
                        .info(&format!("downloading {} missing tracks", pending.len()));
                    let failed = self.orchestrator.try_download(&pending);
                    outcome.downloaded += pending.len() - failed.len();
                    pending = failed;
                    if pending.is_empty() {
                        self.reporter.info("all downloads completed");
                        Stage::Terminal
                    } else {
                        Stage::RecheckAgainstRefreshedLibrary
                    }
                }
                Stage::RecheckAgainstRefreshedLibrary => {
                    self.reporter.info(&format!(
                        "rechecking {} failed tracks against the refreshed library",
                        pending.len()
                    ));
                    let refreshed = self.index.refresh();
                    let Reconciliation { present, missing } =
                        self.retry.reconcile(&pending, &refreshed.keys);
                    outcome.recovered_on_recheck = present;
                    pending = missing;
                    if pending.is_empty() {
                        self.reporter.info("every failed track was found on recheck");
                        Stage::Terminal
                    } else {
                        Stage::DownloadRound2
                    }
                }
                Stage::DownloadRound2 => {
                    self.reporter
                        .info(&format!("retrying {} downloads", pending.len()));
                    let failed = self.orchestrator.try_download(&pending);
                    outcome.downloaded += pending.len() - failed.len();
                    pending = failed;
                    Stage::Terminal
                }
                Stage::Terminal => Stage::Terminal,
            };
        }

        outcome.failed = pending;
        outcome
    }

    /// Deletes every corrupt library file and re-resolves it exactly once.
    ///
    /// A re-download is not verified again.
    pub fn verify_and_repair(&self) -> RepairSummary {
        let corrupt = integrity::verify_folder(self.index.folder(), self.reporter.as_ref());
        let mut summary = RepairSummary {
            corrupt: corrupt.len(),
            ..Default::default()
        };

        for (idx, record) in corrupt.iter().enumerate() {
            if idx > 0 {
                self.orchestrator.pause();
            }
            if let Err(e) = std::fs::remove_file(&record.path) {
                self.reporter.error(&format!(
                    "could not delete corrupt file {}: {e}",
                    record.path.to_string_lossy()
                ));
                summary.not_recovered += 1;
                continue;
            }
            self.reporter.info(&format!(
                "deleted corrupt file {}, downloading again",
                record.path.to_string_lossy()
            ));

            if self
                .orchestrator
                .resolve_and_download(&record.title, &record.artist)
            {
                summary.redownloaded += 1;
            } else {
                summary.not_recovered += 1;
            }
        }

        summary
    }

    /// Runs everything after the initial index build and playlist fetch.
    pub fn execute(&self, tracks: &[RemoteTrackRef], local: &LocalKeys) -> Result<RunSummary, StorageError> {
        let rounds = self.run_rounds(tracks, local);

        let repair = self.integrity_check.then(|| self.verify_and_repair());

        let report_written = write_failure_report(
            &self.failure_report,
            &rounds.failed,
            self.reporter.as_ref(),
        )?;
        if report_written {
            self.reporter.error(&format!(
                "{} tracks could not be downloaded, see {}",
                rounds.failed.len(),
                self.failure_report.to_string_lossy()
            ));
        }

        Ok(RunSummary {
            rounds,
            repair,
            report_written,
        })
    }
}

pub type LivePipeline =
    Pipeline<CatalogClient<UreqTransport, ThreadSleeper>, DownloaderTool<ProcessRunner>, ThreadSleeper>;

pub fn local_index(cfg: &Config, reporter: Rc<dyn Reporter>) -> LocalIndex {
    LocalIndex::new(
        cfg.library.tracks_dir(),
        Normalizer::new(&cfg.matching.noise_phrase),
        reporter,
    )
    .with_cache(cfg.library.cache_enabled, cfg.library.cache_ttl())
}

pub fn playlist_source(cfg: &config::Playlist) -> Box<dyn PlaylistSource> {
    match cfg {
        config::Playlist::Ytmusic { url } => {
            Box::new(YtMusicPlaylist::new(url.clone(), UreqTransport::new()))
        }
        config::Playlist::File { path } => Box::new(FilePlaylist::new(path.clone())),
    }
}

/// Wires the real catalog client and downloader.
///
/// Missing or rejected credentials abort here, before anything is downloaded.
pub fn build_live(cfg: &Config, reporter: Rc<dyn Reporter>) -> anyhow::Result<LivePipeline> {
    let credentials = cfg.catalog.credentials()?;
    reporter.info("requesting access token");
    let token = fetch_access_token(&UreqTransport::new(), &credentials, reporter.as_ref())
        .context("failed to obtain catalog access token")?;

    let normalizer = Normalizer::new(&cfg.matching.noise_phrase);
    let catalog = CatalogClient::new(
        UreqTransport::new(),
        ThreadSleeper,
        token,
        SearchSettings::from(&cfg.catalog),
        normalizer,
        reporter.clone(),
    );

    let program = resolve_executable(&cfg.downloader.command);
    let tool = DownloaderTool::new(program, ProcessRunner, cfg.downloader.timeout(), reporter.clone());
    let index = local_index(cfg, reporter.clone());

    if let Err(e) = tool.configure(index.folder(), &cfg.downloader.audio_quality) {
        reporter.error(&format!("could not update downloader settings: {e}"));
    }

    let orchestrator = Orchestrator::new(
        catalog,
        tool,
        ThreadSleeper,
        cfg.catalog.throttle(),
        reporter.clone(),
    );

    Ok(Pipeline::new(
        index,
        orchestrator,
        PipelineOptions::from_config(cfg),
        reporter,
    ))
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, path::Path, rc::Rc, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        download::orchestrator::testing::{FakeDownloader, FakeResolver},
        pacing::testing::RecordingSleeper,
        reporter::testing::MemoryReporter,
        storage::report::read_failure_report,
    };

    type TestPipeline = Pipeline<FakeResolver, FakeDownloader, RecordingSleeper>;

    fn pipeline(
        library: &Path,
        resolver: FakeResolver,
        downloader: FakeDownloader,
        integrity_check: bool,
    ) -> TestPipeline {
        let reporter: Rc<dyn Reporter> = Rc::new(MemoryReporter::default());
        let index = LocalIndex::new(library.to_path_buf(), Normalizer::default(), reporter.clone());
        let orchestrator = Orchestrator::new(
            resolver,
            downloader,
            RecordingSleeper::default(),
            Duration::ZERO,
            reporter.clone(),
        );
        Pipeline::new(
            index,
            orchestrator,
            PipelineOptions {
                initial_threshold: 0.5,
                retry_threshold: 0.2,
                trace: false,
                integrity_check,
                failure_report: library.join("missing_tracks.json"),
            },
            reporter,
        )
    }

    fn tracks(pairs: &[(&str, &str)]) -> Vec<RemoteTrackRef> {
        let n = Normalizer::default();
        pairs
            .iter()
            .map(|(title, artist)| RemoteTrackRef::new(*title, *artist, &n))
            .collect()
    }

    fn failing(urls: &[&str]) -> HashSet<String> {
        urls.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn present_tracks_are_never_downloaded() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(tmp.path(), FakeResolver::default(), FakeDownloader::default(), false);
        let local: LocalKeys = [Normalizer::default().normalize("foo bar")].into();

        let outcome = p.run_rounds(&tracks(&[("Bar", "Foo")]), &local);

        assert_eq!(outcome.present, 1);
        assert!(outcome.failed.is_empty());
        assert_eq!(p.orchestrator_attempts(), 0);
    }

    #[test]
    fn successful_first_round_ends_without_recheck() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let p = pipeline(tmp.path(), FakeResolver::default(), FakeDownloader::default(), false);

        let summary = p.execute(&tracks(&[("One", "A"), ("Two", "B")]), &LocalKeys::new())?;

        assert_eq!(summary.rounds.downloaded, 2);
        assert!(summary.rounds.failed.is_empty());
        assert!(!summary.report_written);
        assert!(!tmp.path().join("missing_tracks.json").exists());
        // recheck refreshes the index, which would have written a cache file
        assert!(!p.index().cache_path().exists());
        Ok(())
    }

    #[test]
    fn lenient_recheck_suppresses_second_download() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().to_path_buf();
        let downloader = FakeDownloader {
            failing: failing(&["track://Teardrop"]),
            // the tool reported failure but a file still landed under a different name
            on_attempt: Some(Box::new(move |_: &str| {
                std::fs::write(folder.join("Massive Attack - Teardrop (2019 Remaster).flac"), b"x").unwrap();
            })),
            ..Default::default()
        };
        let p = pipeline(tmp.path(), FakeResolver::default(), downloader, false);

        let outcome = p.run_rounds(&tracks(&[("Teardrop", "Massive Attack")]), &LocalKeys::new());

        assert_eq!(outcome.recovered_on_recheck.len(), 1);
        assert!(outcome.failed.is_empty());
        assert_eq!(p.orchestrator_attempts(), 1);
    }

    #[test]
    fn weak_match_is_downloaded_first_then_accepted_on_recheck() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("abcxxxxxxx.mp3"), b"x").unwrap();
        let downloader = FakeDownloader {
            failing: failing(&["track://abcd"]),
            ..Default::default()
        };
        let p = pipeline(tmp.path(), FakeResolver::default(), downloader, false);
        let local = p.index().build().keys;

        // best similarity is 0.3: below the strict threshold, above the lenient one
        let outcome = p.run_rounds(&tracks(&[("abcd", "efghi")]), &local);

        assert_eq!(outcome.present, 0);
        assert_eq!(outcome.recovered_on_recheck.len(), 1);
        assert!(outcome.failed.is_empty());
        assert_eq!(p.orchestrator_attempts(), 1);
    }

    #[test]
    fn tracks_failing_both_rounds_are_reported_in_order() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let resolver = FakeResolver {
            unknown: ["Zeta".to_string()].into(),
            ..Default::default()
        };
        let downloader = FakeDownloader {
            failing: failing(&["track://Alpha"]),
            ..Default::default()
        };
        let p = pipeline(tmp.path(), resolver, downloader, false);
        let input = tracks(&[("Zeta", "Z"), ("Ok", "O"), ("Alpha", "A")]);

        let summary = p.execute(&input, &LocalKeys::new())?;

        let expected = vec![input[0].clone(), input[2].clone()];
        assert_eq!(summary.rounds.failed, expected);
        assert_eq!(summary.rounds.downloaded, 1);
        assert!(summary.report_written);
        assert_eq!(read_failure_report(&tmp.path().join("missing_tracks.json"))?, expected);
        // Zeta and Alpha resolved twice, Ok once
        assert_eq!(p.resolver_calls().len(), 5);
        Ok(())
    }

    #[test]
    fn corrupt_file_is_deleted_and_resolved_once() {
        let tmp = TempDir::new().unwrap();
        let corrupt = tmp.path().join("Band - Song.mp3");
        std::fs::write(&corrupt, b"").unwrap();
        let resolver = FakeResolver {
            unknown: ["Song".to_string()].into(),
            ..Default::default()
        };
        let p = pipeline(tmp.path(), resolver, FakeDownloader::default(), true);

        let summary = p.verify_and_repair();

        assert_eq!(
            summary,
            RepairSummary {
                corrupt: 1,
                redownloaded: 0,
                not_recovered: 1
            }
        );
        assert!(!corrupt.exists());
        assert_eq!(
            p.resolver_calls(),
            vec![("Song".to_string(), "Band".to_string())]
        );
    }

    #[test]
    fn repaired_files_do_not_enter_the_failure_report() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        std::fs::write(tmp.path().join("Band - Song.mp3"), b"")?;
        let resolver = FakeResolver {
            unknown: ["Song".to_string()].into(),
            ..Default::default()
        };
        let p = pipeline(tmp.path(), resolver, FakeDownloader::default(), true);
        let local: LocalKeys = [Normalizer::default().normalize("one a")].into();

        let summary = p.execute(&tracks(&[("One", "A")]), &local)?;

        assert_eq!(summary.repair.map(|r| r.corrupt), Some(1));
        assert!(summary.rounds.failed.is_empty());
        assert!(!summary.report_written);
        Ok(())
    }

    impl TestPipeline {
        fn orchestrator_attempts(&self) -> usize {
            self.orchestrator.downloader().attempts.get()
        }

        fn resolver_calls(&self) -> Vec<(String, String)> {
            self.orchestrator.resolver().calls.borrow().clone()
        }
    }
}
