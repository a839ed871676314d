//! Bounded wait for a single outbound call.
//!
//! A [`ForwardDeadline`] owns a [`CancellationToken`] and a timer task that
//! cancels it once the timeout elapses. The token is the only cancellation path
//! handed to the outbound call: expiry and drop both cancel it, and dropping the
//! deadline also aborts the timer, on every exit path of the caller.
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ForwardDeadline {
    token: CancellationToken,
    expired: Arc<AtomicBool>,
    timeout: Duration,
    timer: JoinHandle<()>,
}

impl ForwardDeadline {
    /// Start the timer. Must be called from within a Tokio runtime.
    pub fn start(timeout: Duration) -> Self {
        let token = CancellationToken::new();
        let expired = Arc::new(AtomicBool::new(false));

        let timer = {
            let token = token.clone();
            let expired = expired.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        expired.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        };

        Self {
            token,
            expired,
            timeout,
            timer,
        }
    }

    /// Token to pass to the outbound call.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// True once the timer, rather than an explicit cancel, fired.
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Cancel the outbound call now.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for ForwardDeadline {
    fn drop(&mut self) {
        self.timer.abort();
        self.token.cancel();
    }
}
