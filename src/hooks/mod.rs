pub mod bspwm;
pub mod pool;
mod subprocess;
pub mod xorg;

pub use self::bspwm::MonitorTopology;
pub use self::pool::HooksPool;
pub use self::xorg::PropertyEvent;

use crate::stop::StopSignal;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{
    sync::mpsc::{self, UnboundedSender},
    task::{JoinHandle, JoinSet},
};

/// The closed set of event sources a pool can listen on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// bspwm report subscription, driven through the given `bspc` binary.
    Bspwm { bspc: String },
    /// Property changes on the X root window.
    XorgWindow,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::Bspwm { bspc } => write!(f, "bspwm hook ({bspc})"),
            HookKind::XorgWindow => f.write_str("xorg window hook"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    Bspwm(MonitorTopology),
    Window(Vec<PropertyEvent>),
}

/// Receives hook notifications. Pools only keep weak references to subscribers.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn notify(&self, event: &HookEvent) -> anyhow::Result<()>;
}

pub(crate) fn same_subscriber(a: &Weak<dyn Subscriber>, b: &Weak<dyn Subscriber>) -> bool {
    std::ptr::addr_eq(a.as_ptr(), b.as_ptr())
}

/// Queue feeding one subscriber, drained by a single task.
struct Delivery {
    subscriber: Weak<dyn Subscriber>,
    queue: UnboundedSender<Arc<HookEvent>>,
}

#[derive(Default)]
struct Deliveries {
    queues: Vec<Delivery>,
    tasks: JoinSet<()>,
}

impl Deliveries {
    fn queue(
        &mut self,
        kind: &HookKind,
        subscriber: &Weak<dyn Subscriber>,
    ) -> UnboundedSender<Arc<HookEvent>> {
        if let Some(delivery) = self
            .queues
            .iter()
            .find(|delivery| same_subscriber(&delivery.subscriber, subscriber))
        {
            return delivery.queue.clone();
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<HookEvent>>();
        let target = subscriber.clone();
        let kind = kind.clone();
        self.tasks.spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(subscriber) = target.upgrade() else {
                    break;
                };
                // A panicking subscriber only loses the event it panicked on.
                match tokio::spawn(async move { subscriber.notify(&event).await }).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::error!("{kind} subscriber failed: {e:#}"),
                    Err(e) => log::error!("{kind} subscriber task failed: {e}"),
                }
            }
        });

        self.queues.push(Delivery {
            subscriber: subscriber.clone(),
            queue: tx.clone(),
        });
        tx
    }
}

/// A background listener for one [`HookKind`].
pub struct Hook {
    kind: HookKind,
    subscribers: Mutex<Vec<Weak<dyn Subscriber>>>,
    stop: StopSignal,
    running: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
    deliveries: Mutex<Deliveries>,
}

impl Hook {
    pub fn new(kind: HookKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            subscribers: Mutex::new(Vec::new()),
            stop: StopSignal::new(),
            running: AtomicBool::new(false),
            listener: Mutex::new(None),
            deliveries: Mutex::new(Deliveries::default()),
        })
    }

    pub fn kind(&self) -> &HookKind {
        &self.kind
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Adds a subscriber unless it is already registered.
    pub fn add_subscriber(&self, subscriber: Weak<dyn Subscriber>) -> bool {
        let mut subscribers = self.subscribers.lock();
        if subscribers
            .iter()
            .any(|known| same_subscriber(known, &subscriber))
        {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    pub fn subscribers(&self) -> Vec<Weak<dyn Subscriber>> {
        self.subscribers.lock().clone()
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the listening task. Starting a running hook does nothing.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop.reset();

        log::info!("Starting {}", self.kind);

        let hook = Arc::clone(self);
        let handle = tokio::spawn(async move {
            match hook.kind.clone() {
                HookKind::Bspwm { bspc } => {
                    subprocess::listen(
                        &hook,
                        bspwm::subscribe_command(&bspc),
                        MonitorTopology::parse_event,
                    )
                    .await;
                }
                HookKind::XorgWindow => {
                    xorg::poll_queue(&hook, xorg::XpropSpy::open, xorg::DEFAULT_REFRESH).await;
                }
            }
            hook.running.store(false, Ordering::SeqCst);
            log::debug!("{} stopped", hook.kind);
        });

        *self.listener.lock() = Some(handle);
    }

    /// Delivers `event` to every live subscriber.
    ///
    /// Subscribers are served concurrently, but each one receives the events
    /// of this hook in the order they were notified. A failing subscriber
    /// never affects its siblings.
    pub fn notify(&self, event: HookEvent) {
        let event = Arc::new(event);
        let subscribers = self.subscribers();
        let mut deliveries = self.deliveries.lock();

        while let Some(done) = deliveries.tasks.try_join_next() {
            if let Err(e) = done {
                log::error!("{} delivery task failed: {e}", self.kind);
            }
        }
        deliveries.queues.retain(|delivery| {
            delivery.subscriber.strong_count() > 0 && !delivery.queue.is_closed()
        });

        for subscriber in subscribers.iter().filter(|s| s.strong_count() > 0) {
            let queue = deliveries.queue(&self.kind, subscriber);
            if queue.send(Arc::clone(&event)).is_err() {
                log::warn!("{} dropped an event for a closed subscriber", self.kind);
            }
        }
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Waits for the listener and every pending delivery to finish.
    pub async fn join(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener
            && let Err(e) = listener.await
        {
            log::error!("{} listener failed: {e}", self.kind);
        }

        // Closing the queues lets every delivery task drain and end.
        let mut tasks = {
            let mut deliveries = self.deliveries.lock();
            deliveries.queues.clear();
            std::mem::take(&mut deliveries.tasks)
        };
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                log::error!("{} delivery task failed: {e}", self.kind);
            }
        }
    }
}
