//! CLI argument definitions using clap
//!
//! - walkcap record [--duration 30s] [--depth] [--upload]
//! - walkcap upload <bundle>
//! - walkcap queue list|status|retry|cancel|ack|run
//! - walkcap recover [--upload]
//! - walkcap config init|show

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use walkcap_core::CaptureSource;

#[derive(Parser)]
#[command(name = "walkcap")]
#[command(about = "Record walkthrough captures and upload them")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (defaults to ~/.walkcap/config.toml)
    #[arg(long, global = true, env = "WALKCAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging for walkcap crates
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a session from the simulated device sensors
    Record(RecordArgs),

    /// Queue a sealed bundle for upload and wait for it
    Upload {
        /// Session directory containing manifest.json
        bundle: PathBuf,

        #[command(flatten)]
        ids: IdArgs,

        /// Return once queued instead of waiting for completion
        #[arg(long)]
        no_wait: bool,
    },

    /// Inspect and control upload jobs
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Seal sessions left unfinished by a crash
    Recover {
        /// Queue every recovered bundle for upload
        #[arg(long)]
        upload: bool,
    },

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Clone, Default)]
pub struct IdArgs {
    /// Capture target the walkthrough belongs to
    #[arg(long)]
    pub target: Option<String>,

    /// Booking reservation the walkthrough belongs to
    #[arg(long)]
    pub reservation: Option<String>,
}

#[derive(Args)]
pub struct RecordArgs {
    /// Stop after this long (e.g. 30s, 2m); otherwise record until Ctrl+C
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Session id (random when omitted)
    #[arg(long)]
    pub session_id: Option<String>,

    /// Who is recording
    #[arg(long, env = "WALKCAP_CREATOR", default_value = "local")]
    pub creator: String,

    #[command(flatten)]
    pub ids: IdArgs,

    /// Simulate a device with a depth sensor
    #[arg(long)]
    pub depth: bool,

    /// Capture device family
    #[arg(long, default_value = "iphone")]
    pub source: CaptureSource,

    /// Intended space type written into the manifest
    #[arg(long)]
    pub space_type: Option<String>,

    /// Queue the sealed bundle for upload right away
    #[arg(long)]
    pub upload: bool,
}

#[derive(Subcommand, Clone)]
pub enum QueueAction {
    /// List every job in the journal
    List,

    /// Show one job
    Status { job_id: String },

    /// Requeue a failed job
    Retry { job_id: String },

    /// Cancel a queued or uploading job
    Cancel { job_id: String },

    /// Forget a completed or cancelled job
    Ack { job_id: String },

    /// Resume queued jobs and wait until the queue is idle
    Run,
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Display the effective configuration
    Show,

    /// Write a configuration file with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_record_args() {
        let cli = Cli::parse_from([
            "walkcap",
            "record",
            "--duration",
            "30s",
            "--depth",
            "--source",
            "glasses",
            "--target",
            "t-1",
        ]);
        match cli.command {
            Commands::Record(args) => {
                assert_eq!(args.duration, Some(Duration::from_secs(30)));
                assert!(args.depth);
                assert_eq!(args.source, CaptureSource::Glasses);
                assert_eq!(args.ids.target.as_deref(), Some("t-1"));
                assert!(!args.upload);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn test_queue_retry_args() {
        let cli = Cli::parse_from(["walkcap", "queue", "retry", "job-1", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Queue {
                action: QueueAction::Retry { ref job_id }
            } if job_id == "job-1"
        ));
    }
}
