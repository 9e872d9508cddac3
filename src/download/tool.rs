//! Wrapper around the external downloader executable

use std::{
    path::{Path, PathBuf},
    rc::Rc,
    sync::LazyLock,
    time::Duration,
};

use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    download::{Downloader, error::DownloadError, runner::CommandRunner},
    reporter::Reporter,
};

static SETTINGS_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Config:\s+(.*settings\.json)").unwrap());

/// Locates `command`: an existing path first, then `PATH`, then common user bin dirs.
///
/// Falls back to the bare command so that spawning reports a clear not-found error.
pub fn resolve_executable(command: &str) -> PathBuf {
    let direct = Path::new(command);
    if direct.exists() {
        return std::path::absolute(direct).unwrap_or_else(|_| direct.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect())
        .unwrap_or_default();

    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("bin"));
        candidates.push(home.join(".local").join("bin"));
        candidates.push(home);
    }
    candidates.extend(
        ["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin"]
            .iter()
            .map(PathBuf::from),
    );

    let names: Vec<String> = if cfg!(windows) && !command.to_lowercase().ends_with(".exe") {
        vec![command.to_string(), format!("{command}.exe")]
    } else {
        vec![command.to_string()]
    };

    candidates
        .iter()
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(command))
}

/// Points the downloader's own settings at the library folder and quality preference,
/// keeping every other key.
pub fn update_settings(settings_path: &Path, library_dir: &Path, quality: &str) -> Result<(), DownloadError> {
    let contents = std::fs::read_to_string(settings_path)?;
    let mut settings: Map<String, Value> = serde_json::from_str(&contents)?;

    settings.insert(
        "download_base_path".into(),
        Value::String(library_dir.to_string_lossy().into_owned()),
    );
    settings.insert("quality_audio".into(), Value::String(quality.to_string()));

    std::fs::write(settings_path, serde_json::to_string_pretty(&settings)?)?;
    Ok(())
}

pub struct DownloaderTool<R: CommandRunner> {
    program: PathBuf,
    runner: R,
    timeout: Duration,
    reporter: Rc<dyn Reporter>,
}

impl<R: CommandRunner> DownloaderTool<R> {
    pub fn new(program: PathBuf, runner: R, timeout: Duration, reporter: Rc<dyn Reporter>) -> Self {
        Self {
            program,
            runner,
            timeout,
            reporter,
        }
    }

    /// Finds the tool's settings file via `cfg` output and rewrites the library path
    /// and audio quality in it. Returns the settings path.
    pub fn configure(&self, library_dir: &Path, quality: &str) -> Result<PathBuf, DownloadError> {
        self.reporter.info(&format!(
            "configuring downloader {}",
            self.program.to_string_lossy()
        ));
        let out = self.runner.run(&self.program, &["cfg"], self.timeout)?;

        let settings_path = SETTINGS_PATH
            .captures(&out.stdout)
            .and_then(|c| c.get(1))
            .map(|m| PathBuf::from(m.as_str().trim()))
            .ok_or_else(|| DownloadError::SettingsNotFound(format!("{}{}", out.stdout, out.stderr)))?;

        self.reporter.info(&format!(
            "downloader settings: {}",
            settings_path.to_string_lossy()
        ));
        update_settings(&settings_path, library_dir, quality)?;
        Ok(settings_path)
    }
}

impl<R: CommandRunner> Downloader for DownloaderTool<R> {
    fn download(&self, url: &str) -> bool {
        self.reporter.info(&format!("downloading {url}"));

        match self.runner.run(&self.program, &["dl", url], self.timeout) {
            Ok(out) => {
                if !out.stdout.trim().is_empty() {
                    self.reporter.info(out.stdout.trim_end());
                }
                if !out.stderr.trim().is_empty() {
                    self.reporter.warn(out.stderr.trim_end());
                }
                if !out.success() {
                    self.reporter.warn(&format!(
                        "downloader exited with {}",
                        out.code
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "signal".into())
                    ));
                }
                out.success()
            }
            Err(e @ DownloadError::TimedOut { .. }) => {
                self.reporter.warn(&e.to_string());
                false
            }
            Err(e @ DownloadError::NotFound(_)) => {
                self.reporter.error(&format!(
                    "{e}, check that the downloader is installed"
                ));
                false
            }
            Err(e) => {
                self.reporter.error(&format!("download failed: {e}"));
                false
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::{cell::RefCell, collections::VecDeque, path::Path, time::Duration};

    use crate::download::{
        error::DownloadError,
        runner::{CommandOutput, CommandRunner},
    };

    /// Replays scripted command results and records argument lists.
    #[derive(Default)]
    pub struct FakeRunner {
        pub results: RefCell<VecDeque<Result<CommandOutput, DownloadError>>>,
        pub calls: RefCell<Vec<Vec<String>>>,
    }

    impl FakeRunner {
        pub fn new(results: Vec<Result<CommandOutput, DownloadError>>) -> Self {
            Self {
                results: RefCell::new(results.into()),
                calls: RefCell::default(),
            }
        }
    }

    pub fn exited(code: i32, stdout: &str) -> Result<CommandOutput, DownloadError> {
        Ok(CommandOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, _program: &Path, args: &[&str], _timeout: Duration) -> Result<CommandOutput, DownloadError> {
            self.calls
                .borrow_mut()
                .push(args.iter().map(|a| a.to_string()).collect());
            self.results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| exited(1, ""))
        }
    }
}
