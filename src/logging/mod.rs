//! Console output for the command line client
//!
//! The library reports through `tracing`; this module provides the [`Logger`]
//! used by the binary for user-facing output, with quiet and verbose modes and
//! helpers to render progress, sizes and durations.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::update::{LogUpdateEvent, StreamType, TotalProgressEvent};

const PROGRESS_BAR_WIDTH: usize = 30;

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    verbose: bool,
    quiet: bool,
    start_time: Instant,
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Instant::now(),
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            quiet: true,
            ..Self::new(false)
        }
    }

    fn line(&self, marker: &str, message: &str) {
        if !self.quiet {
            println!("{}{}", marker, message);
        }
    }

    /// Heading for one command, e.g. `=== Pulling ubuntu:latest ===`
    pub fn section(&self, title: &str) {
        self.line("", &format!("\n=== {} ===", title));
    }

    pub fn info(&self, message: &str) {
        self.line("ℹ️  ", message);
    }

    pub fn success(&self, message: &str) {
        self.line("✅ ", message);
    }

    pub fn warning(&self, message: &str) {
        self.line("⚠️  WARNING: ", message);
    }

    /// Shown even in quiet mode
    pub fn error(&self, message: &str) {
        eprintln!("❌ ERROR: {}", message);
    }

    pub fn step(&self, message: &str) {
        self.line("▶️  ", message);
    }

    /// Verbose mode only
    pub fn detail(&self, message: &str) {
        if self.verbose {
            self.line("   ", message);
        }
    }

    /// Image inspect summary, one `key: value` line per item
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        self.line("", &format!("\n--- {} ---", title));
        for (key, value) in items {
            self.line("  ", &format!("{}: {}", key, value));
        }
    }

    /// Redraw the progress bar line for an image transfer
    pub fn total_progress(&self, label: &str, event: TotalProgressEvent) {
        if self.quiet {
            return;
        }
        print!("\r\x1b[K⏳ {} {} {:>3}%", label, progress_bar(event.percent(), PROGRESS_BAR_WIDTH), event.percent());
        if event.percent() >= 100 {
            println!();
        }
        let _ = io::stdout().flush();
    }

    /// One line of container output; stderr lines go to stderr
    pub fn container_output(&self, event: &LogUpdateEvent) {
        match event.stream_type() {
            StreamType::StdErr => eprintln!("    [container] {}", event),
            _ => self.line("    [container] ", &event.to_string()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn format_size(&self, bytes: u64) -> String {
        const UNITS: [&str; 3] = ["KB", "MB", "GB"];
        if bytes < 1024 {
            return format!("{} B", bytes);
        }
        let mut size = bytes as f64 / 1024.0;
        let mut unit = 0;
        while size >= 1024.0 && unit + 1 < UNITS.len() {
            size /= 1024.0;
            unit += 1;
        }
        format!("{:.1} {}", size, UNITS[unit])
    }

    /// `42s`, `2m5s`, `1h2m5s`
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        match (hours, minutes) {
            (0, 0) => format!("{}s", seconds),
            (0, _) => format!("{}m{}s", minutes, seconds),
            _ => format!("{}h{}m{}s", hours, minutes, seconds),
        }
    }
}

fn progress_bar(percent: u8, width: usize) -> String {
    let filled = (percent.min(100) as usize * width) / 100;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}
