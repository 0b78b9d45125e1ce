use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Leading + trailing edge rate limiter.
///
/// The first trigger fires the action immediately. Triggers arriving during the
/// following interval coalesce into a single trailing invocation at its end, so
/// at most one action starts per interval no matter how fast triggers arrive.
///
/// Each action runs as its own task; dropping the throttle stops future
/// invocations but does not cancel actions already started.
#[derive(Debug)]
pub struct Throttle {
    notify: Arc<Notify>,
    task: JoinHandle<()>,
    interval: Duration,
}

impl Throttle {
    pub fn spawn<F, Fut>(interval: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let notify = Arc::new(Notify::new());
        let waiter = Arc::clone(&notify);
        let task = tokio::spawn(async move {
            loop {
                // A trigger during the sleep below leaves one stored permit,
                // which makes this return immediately: the trailing edge.
                waiter.notified().await;
                tokio::spawn(action());
                tokio::time::sleep(interval).await;
            }
        });
        Self {
            notify,
            task,
            interval,
        }
    }

    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
