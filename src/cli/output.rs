//! Output formatting and progress indicators
//!
//! User-facing messages go through this module so that `--quiet` and
//! `--json` apply everywhere. Diagnostics go through `tracing` instead.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::core::precheck::ProgressFn;
use crate::error::BridgeError;

static QUIET: AtomicBool = AtomicBool::new(false);
static JSON: AtomicBool = AtomicBool::new(false);
static VERBOSITY: AtomicU8 = AtomicU8::new(0);

/// Global output settings from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub quiet: bool,
    pub json: bool,
    pub verbosity: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbosity: u8) -> Self {
        Self { quiet, json, verbosity }
    }

    /// Make these settings visible to every output helper
    pub fn apply_global(self) {
        QUIET.store(self.quiet, Ordering::Relaxed);
        JSON.store(self.json, Ordering::Relaxed);
        VERBOSITY.store(self.verbosity, Ordering::Relaxed);
    }

    /// Tracing directive matching the verbosity
    pub fn log_level(self) -> tracing::Level {
        match self.verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        }
    }
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

pub fn is_json() -> bool {
    JSON.load(Ordering::Relaxed)
}

fn is_silent() -> bool {
    is_quiet() || is_json()
}

pub fn print_success(message: &str) {
    if !is_silent() {
        println!("{} {message}", status::SUCCESS);
    }
}

pub fn print_warning(message: &str) {
    if !is_silent() {
        eprintln!("{} {message}", status::WARNING);
    }
}

/// Print a command result: the JSON document in `--json` mode, the
/// human-readable lines otherwise
pub fn print_result(json: &Value, human: &[String]) {
    if is_json() {
        println!("{}", serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string()));
    } else if !is_quiet() {
        for line in human {
            println!("{line}");
        }
    }
}

/// Report a failed command on stderr
pub fn display_error(error: &anyhow::Error) {
    if is_json() {
        let doc = serde_json::json!({
            "error": error.to_string(),
            "causes": error.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
            "exit_code": exit_code(error),
        });
        eprintln!("{doc}");
        return;
    }
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Process exit code for a failed command
///
/// A failing wrapped tool keeps its own code; everything else is 1.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<BridgeError>())
        .map_or(1, BridgeError::exit_code)
}

/// Create a spinner for operations with unknown duration
///
/// Hidden in quiet and JSON modes.
pub fn create_spinner(message: &str) -> ProgressBar {
    if is_silent() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Create a progress bar counting checked repositories
pub fn create_check_bar() -> ProgressBar {
    if is_silent() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} repositories")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░"),
    );
    pb
}

/// Feed `(done, total)` progress updates into a bar
pub fn progress_reporter(bar: ProgressBar) -> ProgressFn {
    Arc::new(move |done: u64, total: u64| {
        bar.set_length(total);
        bar.set_position(done);
    })
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}
