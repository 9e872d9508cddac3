use anyhow::{Context, bail};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::domain::normalize::DEFAULT_NOISE_PHRASE;

pub const CLIENT_ID_ENV: &str = "CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "CLIENT_SECRET";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub library: Library,
    #[serde(default)]
    pub matching: Matching,
    #[serde(default)]
    pub catalog: Catalog,
    pub playlist: Playlist,
    #[serde(default)]
    pub downloader: Downloader,
    #[serde(default)]
    pub output: Output,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Config> {
        let cfg: Config = toml::from_str(contents).with_context(|| "Failed to parse config TOML")?;
        cfg.matching.validate()?;
        Ok(cfg)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Library {
    /// directory holding the library subfolder
    pub root: PathBuf,
    #[serde(default = "default_subfolder")]
    pub subfolder: String,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_true")]
    pub integrity_check: bool,
}

impl Library {
    /// `root/subfolder`, with a leading `~` expanded to the home directory.
    pub fn tracks_dir(&self) -> PathBuf {
        expand_home(&self.root).join(&self.subfolder)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Matching {
    #[serde(default = "default_initial_threshold")]
    pub initial_threshold: f64,
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: f64,
    #[serde(default = "default_noise_phrase")]
    pub noise_phrase: String,
}

impl Default for Matching {
    fn default() -> Self {
        Self {
            initial_threshold: default_initial_threshold(),
            retry_threshold: default_retry_threshold(),
            noise_phrase: default_noise_phrase(),
        }
    }
}

impl Matching {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("initial_threshold", self.initial_threshold),
            ("retry_threshold", self.retry_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("matching.{name} must be within [0, 1], got {value}");
            }
        }
        if self.retry_threshold > self.initial_threshold {
            bail!(
                "matching.retry_threshold ({}) must not exceed matching.initial_threshold ({})",
                self.retry_threshold,
                self.initial_threshold
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Catalog {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,
    #[serde(default = "default_throttle_millis")]
    pub throttle_millis: u64,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            country_code: default_country_code(),
            search_timeout_secs: default_search_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            throttle_millis: default_throttle_millis(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Catalog {
    /// Resolves client credentials, environment variables taking precedence over the file.
    pub fn credentials(&self) -> anyhow::Result<Credentials> {
        let pick = |env: &str, file: &Option<String>| {
            std::env::var(env)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.clone().filter(|v| !v.trim().is_empty()))
        };

        let client_id = pick(CLIENT_ID_ENV, &self.client_id)
            .with_context(|| format!("catalog client id missing, set {CLIENT_ID_ENV}"))?;
        let client_secret = pick(CLIENT_SECRET_ENV, &self.client_secret)
            .with_context(|| format!("catalog client secret missing, set {CLIENT_SECRET_ENV}"))?;

        Ok(Credentials {
            client_id,
            client_secret,
        })
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_millis)
    }
}

/// Which remote playlist variant feeds the run.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Playlist {
    Ytmusic { url: String },
    File { path: PathBuf },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Downloader {
    #[serde(default = "default_downloader_command")]
    pub command: String,
    #[serde(default = "default_downloader_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,
}

impl Default for Downloader {
    fn default() -> Self {
        Self {
            command: default_downloader_command(),
            timeout_secs: default_downloader_timeout_secs(),
            audio_quality: default_audio_quality(),
        }
    }
}

impl Downloader {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Normal,
    Debug,
}

impl Verbosity {
    pub fn is_debug(self) -> bool {
        self == Verbosity::Debug
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Output {
    #[serde(default = "default_failure_report")]
    pub failure_report: PathBuf,
    #[serde(default)]
    pub verbosity: Verbosity,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            failure_report: default_failure_report(),
            verbosity: Verbosity::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_subfolder() -> String {
    "Tracks".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_initial_threshold() -> f64 {
    0.5
}

fn default_retry_threshold() -> f64 {
    0.2
}

fn default_noise_phrase() -> String {
    DEFAULT_NOISE_PHRASE.to_string()
}

fn default_country_code() -> String {
    "US".to_string()
}

fn default_search_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_secs() -> u64 {
    2
}

fn default_throttle_millis() -> u64 {
    1000
}

fn default_downloader_command() -> String {
    "tidal-dl-ng".to_string()
}

fn default_downloader_timeout_secs() -> u64 {
    60
}

fn default_audio_quality() -> String {
    "LOSSLESS".to_string()
}

fn default_failure_report() -> PathBuf {
    PathBuf::from("missing_tracks.json")
}
