use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::trace;

use super::error::{BrowserError, BrowserResult};

/// Polls `predicate` until it reports `true` or `timeout` elapses.
///
/// Errors raised by the predicate count as "not ready yet"; the last one is
/// folded into the timeout message.
pub async fn wait_until<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> BrowserResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BrowserResult<bool>>,
{
    let deadline = Instant::now() + timeout;
    let mut last_error: Option<BrowserError> = None;
    loop {
        match predicate().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(err) => {
                trace!(condition = what, error = %err, "wait predicate failed");
                last_error = Some(err);
            }
        }
        let now = Instant::now();
        if now >= deadline {
            let message = match last_error {
                Some(err) => format!("{what} (last error: {err})"),
                None => what.to_string(),
            };
            return Err(BrowserError::Timeout(message));
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Sleeps for a settle interval; zero is a no-op.
pub async fn settle(millis: u64) {
    if millis > 0 {
        sleep(Duration::from_millis(millis)).await;
    }
}
