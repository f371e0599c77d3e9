//! Hold-to-confirm countdown in front of an SOS alert
//!
//! The countdown ticks once per period and runs its action when it reaches
//! zero. [`CountdownHandle::cancel`] before that point means the action never
//! runs; once it has fired, the action runs exactly once and cancel is a
//! no-op. Dropping the handle does not cancel.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

pub struct SosCountdown;

impl SosCountdown {
    /// Count down from `seconds`, calling `on_tick` with the seconds left
    pub fn start<F, Fut, T>(
        seconds: u64,
        on_tick: impl FnMut(u64) + Send + 'static,
        action: F,
    ) -> CountdownHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Self::start_with_period(seconds, Duration::from_secs(1), on_tick, action)
    }

    pub fn start_with_period<F, Fut, T>(
        ticks: u64,
        period: Duration,
        mut on_tick: impl FnMut(u64) + Send + 'static,
        action: F,
    ) -> CountdownHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let phase = Arc::new(AtomicU8::new(PENDING));
        let cancelled = Arc::new(Notify::new());

        let task = {
            let phase = phase.clone();
            let cancelled = cancelled.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                // First tick completes immediately
                interval.tick().await;

                for remaining in (1..=ticks).rev() {
                    on_tick(remaining);
                    tokio::select! {
                        _ = cancelled.notified() => return None,
                        _ = interval.tick() => {}
                    }
                }

                if phase
                    .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return None;
                }
                tracing::debug!("Countdown fired");
                Some(action().await)
            })
        };

        CountdownHandle {
            canceller: CountdownCanceller { phase, cancelled },
            task,
        }
    }
}

/// Cancels a running countdown from anywhere, e.g. a signal handler
#[derive(Debug, Clone)]
pub struct CountdownCanceller {
    phase: Arc<AtomicU8>,
    cancelled: Arc<Notify>,
}

impl CountdownCanceller {
    /// Returns `true` if this prevented the action
    pub fn cancel(&self) -> bool {
        let won = self
            .phase
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            // Stores a permit if the task is between ticks
            self.cancelled.notify_one();
            tracing::info!("Countdown cancelled");
        }
        won
    }
}

pub struct CountdownHandle<T> {
    canceller: CountdownCanceller,
    task: JoinHandle<Option<T>>,
}

impl<T> CountdownHandle<T> {
    /// Stop the countdown. Returns `true` if this prevented the action.
    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    pub fn canceller(&self) -> CountdownCanceller {
        self.canceller.clone()
    }

    pub fn has_fired(&self) -> bool {
        self.canceller.phase.load(Ordering::Acquire) == FIRED
    }

    /// Wait for the countdown to finish. `None` if it was cancelled.
    pub async fn wait(self) -> Option<T> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Countdown task failed: {}", e);
                None
            }
        }
    }
}
