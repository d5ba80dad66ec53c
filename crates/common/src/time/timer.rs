//! One-shot and recurring timers
//!
//! Timers run as tokio tasks and carry a cancellation flag. Cancelling a
//! handle both sets the flag and aborts the backing task, so a cancelled
//! callback never runs even if its sleep has already elapsed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// A timer handle that can be used to cancel a timer
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TimerHandle {
    fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), task: Arc::new(Mutex::new(None)) }
    }

    /// A handle that was never armed (no runtime was available)
    fn unarmed() -> Self {
        let handle = Self::new();
        handle.cancelled.store(true, Ordering::SeqCst);
        handle
    }

    fn attach(&self, task: JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    /// Cancel the timer
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Run `callback` once after `duration`
///
/// Must be called from within a tokio runtime. Outside of one the returned
/// handle is already cancelled and the callback is dropped.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use loadstate_common::time::timer::schedule;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = schedule(Duration::from_secs(5), || {
///         println!("fired");
///     });
///     handle.cancel();
/// }
/// ```
pub fn schedule<F>(duration: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        debug!(delay_ms = duration.as_millis(), "no tokio runtime; timer not armed");
        return TimerHandle::unarmed();
    };

    let handle = TimerHandle::new();
    let handle_clone = handle.clone();

    let task = runtime.spawn(async move {
        sleep(duration).await;
        if !handle_clone.is_cancelled() {
            callback();
        }
    });
    handle.attach(task);

    handle
}

/// Run `callback` every `duration` until the handle is cancelled
///
/// The first invocation happens one full period after the call.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use loadstate_common::time::timer::recurring;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = recurring(Duration::from_secs(1), || {
///         println!("Tick!");
///     });
///
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     handle.cancel();
/// }
/// ```
pub fn recurring<F>(duration: Duration, mut callback: F) -> TimerHandle
where
    F: FnMut() + Send + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        debug!(period_ms = duration.as_millis(), "no tokio runtime; recurring timer not armed");
        return TimerHandle::unarmed();
    };

    let handle = TimerHandle::new();
    let handle_clone = handle.clone();

    let task = runtime.spawn(async move {
        let mut interval = tokio::time::interval(duration);
        interval.tick().await; // Skip first immediate tick

        while !handle_clone.is_cancelled() {
            interval.tick().await;
            if !handle_clone.is_cancelled() {
                callback();
            }
        }
    });
    handle.attach(task);

    handle
}
