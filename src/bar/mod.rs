pub mod lemonbar;
pub mod throttle;

pub use self::lemonbar::{BarCommand, BarProcess};

use self::throttle::{Throttle, ThrottleExt};
use crate::stop::StopSignal;
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::{StreamExt, wrappers::UnboundedReceiverStream};

/// Where rendered markup goes.
#[derive(Debug, Clone)]
pub enum BarOutput {
    Lemonbar(BarCommand),
    /// Every pushed line is sent on the channel instead of a bar process.
    Channel(UnboundedSender<String>),
}

enum BarSink {
    Process(BarProcess),
    Channel(UnboundedSender<String>),
}

impl BarSink {
    fn open(output: &BarOutput) -> Result<Self> {
        match output {
            BarOutput::Lemonbar(command) => BarProcess::spawn(command).map(BarSink::Process),
            BarOutput::Channel(tx) => Ok(BarSink::Channel(tx.clone())),
        }
    }

    async fn push(&mut self, content: &str) -> Result<()> {
        match self {
            BarSink::Process(process) => process.push(content).await,
            BarSink::Channel(tx) => tx
                .send(content.to_owned())
                .map_err(|_| anyhow!("output channel closed")),
        }
    }

    async fn close(self) {
        if let BarSink::Process(process) = self {
            process.close().await;
        }
    }
}

/// Redraw machinery shared by the panel and the screens.
///
/// Redraw requests are queued on a channel and consumed by [`BarSpawner::run`]
/// through a [`Throttle`]: the first request renders right away, the ones
/// arriving during the next `refresh` window collapse into a single render.
pub struct BarSpawner {
    stop: StopSignal,
    content: Mutex<Option<String>>,
    requests: UnboundedSender<()>,
    receiver: Mutex<Option<UnboundedReceiver<()>>>,
}

impl Default for BarSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl BarSpawner {
    pub fn new() -> Self {
        let (requests, receiver) = mpsc::unbounded_channel();
        Self {
            stop: StopSignal::new(),
            content: Mutex::new(None),
            requests,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Requests a redraw.
    pub fn update(&self) {
        // the receiver is owned by self, sending cannot fail
        let _ = self.requests.send(());
    }

    /// Last content pushed to the bar.
    pub fn content(&self) -> Option<String> {
        self.content.lock().clone()
    }

    pub fn set_content(&self, content: Option<String>) {
        *self.content.lock() = content;
    }

    /// Stores `content`, returning whether it differs from the previous one.
    fn replace_content(&self, content: &str) -> bool {
        let mut current = self.content.lock();
        if current.as_deref() == Some(content) {
            return false;
        }
        *current = Some(content.to_owned());
        true
    }

    /// Runs the redraw loop until the stop signal fires.
    ///
    /// Every processed request calls `gather` and pushes the result when it
    /// changed. The first render after opening the output is always pushed.
    pub async fn run<G>(&self, output: BarOutput, refresh: Duration, gather: G) -> Result<()>
    where
        G: Fn() -> String,
    {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| anyhow!("redraw loop is already running"))?;
        let mut requests = UnboundedReceiverStream::new(receiver).throttle(refresh);

        let result = self.redraw(&mut requests, &output, &gather).await;

        *self.receiver.lock() = Some(requests.into_inner().into_inner());
        result
    }

    async fn redraw<G>(
        &self,
        requests: &mut Throttle<UnboundedReceiverStream<()>>,
        output: &BarOutput,
        gather: &G,
    ) -> Result<()>
    where
        G: Fn() -> String,
    {
        let mut sink = BarSink::open(output)?;
        let mut fresh = true;
        self.update();

        loop {
            tokio::select! {
                biased;
                () = self.stop.wait() => break,
                request = requests.next() => {
                    if request.is_none() {
                        break;
                    }

                    let content = gather();
                    if !self.replace_content(&content) && !fresh {
                        continue;
                    }

                    if let Err(e) = sink.push(&content).await {
                        log::error!("Failed to push to the bar: {e:#}");
                        sink.close().await;
                        sink = BarSink::open(output)?;
                        fresh = true;
                        self.update();
                        continue;
                    }
                    fresh = false;
                }
            }
        }

        sink.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test]
    async fn pushes_only_changes() {
        let spawner = Arc::new(BarSpawner::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let renders = Arc::new(AtomicUsize::new(0));

        let running = {
            let spawner = spawner.clone();
            let renders = renders.clone();
            tokio::spawn(async move {
                spawner
                    .run(BarOutput::Channel(tx), Duration::from_millis(1), move || {
                        renders.fetch_add(1, Ordering::SeqCst);
                        "%{l}static".to_owned()
                    })
                    .await
            })
        };

        assert_eq!(rx.recv().await.as_deref(), Some("%{l}static"));
        for _ in 0..3 {
            spawner.update();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        spawner.stop_signal().stop();
        running.await.unwrap().unwrap();

        assert!(renders.load(Ordering::SeqCst) >= 2);
        assert!(rx.try_recv().is_err());
        assert_eq!(spawner.content().as_deref(), Some("%{l}static"));
    }

    #[tokio::test]
    async fn can_run_again_after_stop() {
        let spawner = BarSpawner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        spawner.stop_signal().stop();
        spawner
            .run(BarOutput::Channel(tx.clone()), Duration::from_millis(1), String::new)
            .await
            .unwrap();

        spawner.stop_signal().reset();
        let second = spawner.run(BarOutput::Channel(tx), Duration::from_millis(1), || {
            "again".to_owned()
        });
        let stopper = async {
            assert_eq!(rx.recv().await.as_deref(), Some("again"));
            spawner.stop_signal().stop();
        };
        let (result, ()) = tokio::join!(second, stopper);
        result.unwrap();
    }
}
