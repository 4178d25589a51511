use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

/// Cooperative cancellation shared by every long running task.
///
/// Stopping is idempotent and can be requested from any task or from the
/// signal handler. Waiters observe the request at their next await point.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives as long as self, so this only returns once stopped
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleeps for `duration` unless stopped first. Returns `true` when stopped.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.wait() => true,
            () = tokio::time::sleep(duration) => self.is_stopped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_after_stop() {
        let stop = StopSignal::new();
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.wait().await })
        };

        stop.stop();
        stop.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(stop.is_stopped());
    }

    #[tokio::test]
    async fn sleep_is_interrupted() {
        let stop = StopSignal::new();
        stop.stop();
        assert!(stop.sleep(Duration::from_secs(60)).await);

        stop.reset();
        assert!(!stop.sleep(Duration::from_millis(5)).await);
    }
}
