//! Retrying calls rejected because another operation is in progress

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use crate::client::SdkError;

/// Retry `call` while it fails with one of `codes` (on any 4xx status),
/// until `timeout` elapses
pub async fn retry_on_operation_conflict<T, F, Fut>(
    codes: &[&str],
    timeout: Duration,
    interval: Duration,
    mut call: F,
) -> Result<T, SdkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SdkError>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match call().await {
            Err(e) if is_conflict(&e, codes) && Instant::now() < deadline => {
                debug!("operation in progress ({}), retrying in {:?}", e, interval);
                tokio::time::sleep(interval).await;
            }
            result => return result,
        }
    }
}

fn is_conflict(err: &SdkError, codes: &[&str]) -> bool {
    matches!(err.status(), Some(400..=499))
        && err.error_code().is_some_and(|code| codes.contains(&code))
}
