//! Polling until a resource reaches a target status

use std::future::Future;
use std::time::Duration;

use log::debug;
use thiserror::Error;
use tokio::time::Instant;

use crate::client::SdkError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timeout while waiting for state to become '{target}' (last state: '{last_state}', timeout: {timeout:?})")]
    Timeout {
        target: String,
        last_state: String,
        timeout: Duration,
    },

    #[error("unexpected state '{state}', wanted target '{target}'")]
    UnexpectedState { state: String, target: String },

    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error("{0}")]
    Failed(String),
}

/// Provider-wide override of polling delays
///
/// Timeouts always come from the resource; only the sleeps are replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitPolicy {
    fixed_interval: Option<Duration>,
}

impl WaitPolicy {
    /// Replace every delay and poll interval with `interval`
    pub fn fixed(interval: Duration) -> Self {
        Self {
            fixed_interval: Some(interval),
        }
    }

    pub fn apply(&self, duration: Duration) -> Duration {
        self.fixed_interval.unwrap_or(duration)
    }
}

/// Polls a refresh function until it reports one of the target states
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    pub poll_interval: Duration,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(10 * 60),
            delay: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_policy(mut self, policy: &WaitPolicy) -> Self {
        if !self.delay.is_zero() {
            self.delay = policy.apply(self.delay);
        }
        self.poll_interval = policy.apply(self.poll_interval);
        self
    }

    /// Run the refresh function until a target state, an unexpected state,
    /// an error or the timeout.
    ///
    /// `refresh` returns the observed object and its state.
    pub async fn wait<T, F, Fut>(&self, mut refresh: F) -> Result<T, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(T, String), WaitError>>,
    {
        let deadline = Instant::now() + self.timeout;
        let target = self.target.join(", ");

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        loop {
            let (result, state) = refresh().await?;
            debug!("waiting for [{}], current state: {}", target, state);

            if self.target.contains(&state) {
                return Ok(result);
            }
            if !self.pending.contains(&state) {
                return Err(WaitError::UnexpectedState { state, target });
            }
            if Instant::now() >= deadline {
                return Err(WaitError::Timeout {
                    target,
                    last_state: state,
                    timeout: self.timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
