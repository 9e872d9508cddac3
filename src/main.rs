use crate::cli::run;

pub mod cli;
mod config;
mod domain;
mod download;
mod pacing;
mod pipeline;
mod reconcile;
mod remote;
mod reporter;
mod storage;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
