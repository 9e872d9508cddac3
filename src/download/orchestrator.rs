use std::{rc::Rc, time::Duration};

use crate::{
    domain::track::{DownloadAttemptResult, RemoteTrackRef},
    download::{Downloader, TrackResolver},
    pacing::Sleeper,
    reporter::Reporter,
};

/// Resolves and downloads tracks one at a time, throttled between attempts.
pub struct Orchestrator<C: TrackResolver, D: Downloader, S: Sleeper> {
    resolver: C,
    downloader: D,
    sleeper: S,
    throttle: Duration,
    reporter: Rc<dyn Reporter>,
}

impl<C: TrackResolver, D: Downloader, S: Sleeper> Orchestrator<C, D, S> {
    pub fn new(resolver: C, downloader: D, sleeper: S, throttle: Duration, reporter: Rc<dyn Reporter>) -> Self {
        Self {
            resolver,
            downloader,
            sleeper,
            throttle,
            reporter,
        }
    }

    #[cfg(test)]
    pub fn resolver(&self) -> &C {
        &self.resolver
    }

    #[cfg(test)]
    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    /// Idle delay between consecutive attempts.
    pub fn pause(&self) {
        self.sleeper.sleep(self.throttle);
    }

    /// `false` when the catalog has no match or the downloader fails.
    pub fn resolve_and_download(&self, title: &str, artist: &str) -> bool {
        match self.resolver.resolve(title, artist) {
            Some(url) => self.downloader.download(&url),
            None => {
                self.reporter
                    .warn(&format!("no download target for {title} - {artist}"));
                false
            }
        }
    }

    pub fn attempt(&self, track: &RemoteTrackRef) -> DownloadAttemptResult {
        DownloadAttemptResult {
            track: track.clone(),
            succeeded: self.resolve_and_download(track.title(), track.artist()),
        }
    }

    /// Attempts every track in order and returns the ones that failed, in the same order.
    pub fn try_download(&self, tracks: &[RemoteTrackRef]) -> Vec<RemoteTrackRef> {
        let mut failed = Vec::new();

        for (idx, track) in tracks.iter().enumerate() {
            if idx > 0 {
                self.pause();
            }
            self.reporter
                .info(&format!("[{:02}] {}", idx + 1, track.label()));

            let result = self.attempt(track);
            if !result.succeeded {
                failed.push(result.track);
            }
        }

        failed
    }
}

#[cfg(test)]
pub mod testing {
    use std::{
        cell::{Cell, RefCell},
        collections::HashSet,
    };

    use crate::download::{Downloader, TrackResolver};

    /// Resolves every title except the listed ones to `track://<title>`.
    #[derive(Default)]
    pub struct FakeResolver {
        pub unknown: HashSet<String>,
        pub calls: RefCell<Vec<(String, String)>>,
    }

    impl TrackResolver for FakeResolver {
        fn resolve(&self, title: &str, artist: &str) -> Option<String> {
            self.calls
                .borrow_mut()
                .push((title.to_string(), artist.to_string()));
            (!self.unknown.contains(title)).then(|| format!("track://{title}"))
        }
    }

    /// Fails the listed urls; `on_attempt` runs before every outcome, e.g. to drop files.
    #[derive(Default)]
    pub struct FakeDownloader {
        pub failing: HashSet<String>,
        pub downloads: RefCell<Vec<String>>,
        pub attempts: Cell<usize>,
        pub on_attempt: Option<Box<dyn Fn(&str)>>,
    }

    impl Downloader for FakeDownloader {
        fn download(&self, url: &str) -> bool {
            self.attempts.set(self.attempts.get() + 1);
            if let Some(hook) = &self.on_attempt {
                hook(url);
            }
            if self.failing.contains(url) {
                return false;
            }
            self.downloads.borrow_mut().push(url.to_string());
            true
        }
    }
}
