use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use log::debug;

/// How long blocking tasks (the CAPTCHA prompt) get to finish once the
/// main future is done.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Runs `future` to completion on a fresh multi-threaded runtime, then
/// shuts the runtime down without waiting more than `grace` for blocking
/// tasks still parked on stdin.
pub fn block_on<F: Future>(future: F, grace: Duration) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let output = runtime.block_on(future);
    debug!("Shutting down runtime");
    runtime.shutdown_timeout(grace);
    Ok(output)
}
