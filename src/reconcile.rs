//! Matching remote playlist tracks against the local index

use std::rc::Rc;

use crate::{
    domain::{similarity::similar, track::{MatchOutcome, RemoteTrackRef}},
    reporter::Reporter,
    storage::index::LocalKeys,
};

/// Tracks split into already-present and still-missing, both in playlist order.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub present: Vec<RemoteTrackRef>,
    pub missing: Vec<RemoteTrackRef>,
}

pub struct Reconciler {
    threshold: f64,
    trace: bool,
    reporter: Rc<dyn Reporter>,
}

impl Reconciler {
    /// A track is present when any (pattern, local key) pair scores strictly above `threshold`.
    pub fn new(threshold: f64, reporter: Rc<dyn Reporter>) -> Self {
        Self {
            threshold,
            trace: false,
            reporter,
        }
    }

    /// Emit one debug line per comparison.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Scans patterns against local keys, stopping at the first pair over the threshold.
    pub fn match_track(&self, track: &RemoteTrackRef, local: &LocalKeys) -> MatchOutcome {
        for pattern in track.patterns() {
            for key in local {
                let score = similar(pattern.as_str(), key.as_str());
                if self.trace {
                    self.reporter
                        .debug(&format!("[DEBUG] comparing '{pattern}' vs '{key}' -> {score:.2}"));
                }
                if score > self.threshold {
                    return MatchOutcome {
                        track: track.clone(),
                        matched: true,
                        score: Some(score),
                        local_key: Some(key.clone()),
                    };
                }
            }
        }

        MatchOutcome {
            track: track.clone(),
            matched: false,
            score: None,
            local_key: None,
        }
    }

    pub fn reconcile(&self, tracks: &[RemoteTrackRef], local: &LocalKeys) -> Reconciliation {
        let mut result = Reconciliation::default();

        for track in tracks {
            let outcome = self.match_track(track, local);
            match (outcome.matched, outcome.local_key, outcome.score) {
                (true, Some(key), Some(score)) => {
                    self.reporter.info(&format!(
                        "[SKIP] {} ~ {key} ({score:.2})",
                        track.label()
                    ));
                    result.present.push(outcome.track);
                }
                _ => {
                    self.reporter.info(&format!("[MISS] {}", track.label()));
                    result.missing.push(outcome.track);
                }
            }
        }

        result
    }
}
