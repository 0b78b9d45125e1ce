use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Fixed-period callback loop, stopped when dropped.
///
/// The first call happens one full period after spawning. A zero period is
/// raised to [`MIN_PERIOD`].
#[derive(Debug)]
pub struct Ticker {
    task: JoinHandle<()>,
}

impl Ticker {
    pub fn spawn<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                tick();
            }
        });
        Self { task }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::Ticker;

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period_until_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let ticker = Ticker::spawn(Duration::from_millis(500), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(1250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        drop(ticker);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_still_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _ticker = Ticker::spawn(Duration::ZERO, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(count.load(Ordering::SeqCst) >= 5);
    }
}
