//! Ctrl+C / SIGTERM handling

use futures::stream::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;

/// Resolve on the first SIGINT or SIGTERM
pub async fn interrupted() -> anyhow::Result<i32> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    let signal = signals.next().await.unwrap_or(SIGINT);
    handle.close();
    Ok(signal)
}
