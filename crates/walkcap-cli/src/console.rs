//! CLI console output and upload progress bars

use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use walkcap_core::{CaptureEvent, SharedEventBus};

/// CLI console for formatted output
pub struct CliConsole;

impl CliConsole {
    pub const fn new() -> Self {
        Self
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message.green());
    }

    pub fn warn(&self, message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message.yellow());
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message.red());
    }

    pub fn print_header(&self, title: &str) {
        println!();
        println!("{}", title.bold().underline());
        println!("{}", "=".repeat(title.len()).dimmed());
    }

    pub fn field(&self, name: &str, value: impl std::fmt::Display) {
        println!("  {:<18} {}", format!("{name}:").dimmed(), value);
    }

    /// Spinner shown while a session records
    pub fn spinner(&self, message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.red} {msg} {elapsed}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

const BAR_SCALE: u64 = 1000;

/// Render one bar per upload job from the event bus until the bus closes
pub fn spawn_upload_progress(events: &SharedEventBus) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_bar()
            .template("{prefix:.cyan} [{bar:30.green/white}] {percent:>3}% {msg}")
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let mut bars: HashMap<String, ProgressBar> = HashMap::new();

        let mut bar_for = |job_id: &str| {
            bars.entry(job_id.to_string())
                .or_insert_with(|| {
                    let pb = multi.add(ProgressBar::new(BAR_SCALE));
                    pb.set_style(style.clone());
                    pb.set_prefix(job_id.chars().take(8).collect::<String>());
                    pb
                })
                .clone()
        };

        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            match event {
                CaptureEvent::UploadQueued { job_id } => bar_for(&job_id).set_message("queued"),
                CaptureEvent::UploadProgress { job_id, progress } => {
                    let pb = bar_for(&job_id);
                    pb.set_position((progress * BAR_SCALE as f64) as u64);
                    pb.set_message("uploading");
                }
                CaptureEvent::UploadRetrying {
                    job_id,
                    attempt,
                    delay,
                    ..
                } => bar_for(&job_id).set_message(format!(
                    "retry {} in {}",
                    attempt,
                    humantime::format_duration(delay)
                )),
                CaptureEvent::UploadCompleted { job_id } => {
                    let pb = bar_for(&job_id);
                    pb.set_position(BAR_SCALE);
                    pb.finish_with_message("done".green().to_string());
                }
                CaptureEvent::UploadFailed { job_id, reason } => {
                    bar_for(&job_id).abandon_with_message(format!("failed: {reason}").red().to_string())
                }
                CaptureEvent::UploadCancelled { job_id } => {
                    bar_for(&job_id).abandon_with_message("cancelled".yellow().to_string())
                }
                _ => {}
            }
        }
    })
}
