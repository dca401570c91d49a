//! walkcap command-line interface
//!
//! Records walkthrough sessions from simulated sensors, seals them into bundles and drives the
//! durable upload queue.
//!
//! ```bash
//! walkcap record --duration 30s --depth --upload
//! walkcap queue list
//! walkcap recover --upload
//! ```

mod args;
mod commands;
mod console;
mod logging;
mod router;
mod signals;

use clap::Parser;

pub use args::{Cli, Commands, ConfigAction, QueueAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    router::route(cli).await
}
