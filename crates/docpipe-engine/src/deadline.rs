//! Soft deadline for a whole workflow run.
//!
//! One countdown per run. Expiry is communicated two ways and two ways
//! only: the non-blocking [`DeadlineController::is_expired`] poll, checked
//! by the orchestrator between steps, and a one-shot async callback fired
//! at expiry. The controller never interrupts an in-flight step; the
//! worst-case overrun is one step's duration past the deadline.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A single armed countdown with an at-most-once expiry callback.
pub struct DeadlineController {
    deadline: Instant,
    cancel: CancellationToken,
    timer: Option<JoinHandle<()>>,
}

impl DeadlineController {
    /// Arm a countdown of `duration` from now.
    ///
    /// `on_expire` runs at most once, at expiry, on a spawned task. It is
    /// expected to persist a paused session record before returning; it has
    /// no way to report errors, so it should log its own failures.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(duration: Duration, on_expire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + duration;
        let cancel = CancellationToken::new();
        let armed = cancel.clone();

        let timer = tokio::spawn(async move {
            tokio::select! {
                () = armed.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    on_expire().await;
                }
            }
        });

        Self {
            deadline,
            cancel,
            timer: Some(timer),
        }
    }

    /// Non-blocking expiry check, polled between steps.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Disarm the timer. Safe to call multiple times; called on normal
    /// completion so no callback fires after the run has already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the timer task to settle (fired or disarmed). Test seam.
    pub async fn join(&mut self) {
        if let Some(timer) = self.timer.take() {
            let _ = timer.await;
        }
    }
}

impl Drop for DeadlineController {
    fn drop(&mut self) {
        // A dropped controller must not leave a timer firing later.
        self.cancel.cancel();
    }
}
