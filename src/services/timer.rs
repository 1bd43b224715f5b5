use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Work spawned on each tick of a repeating timer.
pub type Tick = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Exclusive ownership of a repeating timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `on_tick` every `period`, starting one period from now.
///
/// Each tick's future is spawned rather than awaited, so cancelling the handle
/// takes effect immediately even while a tick's work is still running; that
/// work is left to finish on its own.
pub fn schedule_repeating<F>(period: Duration, mut on_tick: F) -> PollHandle
where
    F: FnMut() -> Tick + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tokio::spawn(on_tick());
        }
    });

    PollHandle { task }
}
