//! Acquisition of missing tracks through the catalog and the external downloader

pub mod error;
pub mod orchestrator;
pub mod runner;
pub mod tool;

/// Turns a title/artist pair into a downloadable track reference.
pub trait TrackResolver {
    fn resolve(&self, title: &str, artist: &str) -> Option<String>;
}

/// Fetches one resolved reference into the library; `true` on success.
pub trait Downloader {
    fn download(&self, url: &str) -> bool;
}
