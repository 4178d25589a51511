pub mod bspwm;
pub mod subprocess;
pub mod text;
pub mod window_title;

pub use self::{
    bspwm::{BspwmDesktopPoolWidget, BspwmDesktopWidget},
    subprocess::SubprocessWidget,
    text::TextWidget,
    window_title::WindowTitleWidget,
};

use crate::{
    hooks::HooksPool,
    markup::{self, Actions, Decoration},
    screen::Screen,
    stop::StopSignal,
};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::{
    future::Future,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinSet;

pub use crate::panel::DEFAULT_REFRESH;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Style {
    pub fg: Option<String>,
    pub bg: Option<String>,
    pub padding: usize,
    pub fonts: Vec<usize>,
    pub actions: Actions,
}

impl Style {
    pub fn decoration(&self) -> Decoration<'_> {
        Decoration {
            fg: self.fg.as_deref(),
            bg: self.bg.as_deref(),
            padding: self.padding,
            font: self.fonts.first().copied(),
            actions: Some(&self.actions),
        }
    }
}

/// State every widget carries: cached content, attached screens, its own
/// hooks pool and the bookkeeping of its background work.
pub struct WidgetCore {
    style: Style,
    refresh: Option<Duration>,
    content: Mutex<Option<String>>,
    screens: RwLock<Vec<Weak<Screen>>>,
    hooks: Arc<HooksPool>,
    stop: StopSignal,
    start_lock: tokio::sync::Mutex<()>,
    /// Held from reading the widget state to caching the result.
    compute_lock: tokio::sync::Mutex<()>,
    started: AtomicBool,
    tasks: Mutex<JoinSet<()>>,
}

impl WidgetCore {
    pub fn new(style: Style, refresh: Option<Duration>) -> Self {
        Self {
            style,
            refresh,
            content: Mutex::new(None),
            screens: RwLock::new(Vec::new()),
            hooks: HooksPool::new(),
            stop: StopSignal::new(),
            start_lock: tokio::sync::Mutex::new(()),
            compute_lock: tokio::sync::Mutex::new(()),
            started: AtomicBool::new(false),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn hooks(&self) -> &Arc<HooksPool> {
        &self.hooks
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn content(&self) -> Option<String> {
        self.content.lock().clone()
    }

    /// Explicit refresh, else the smallest one among the attached screens.
    pub fn refresh(&self) -> Duration {
        self.refresh
            .filter(|refresh| !refresh.is_zero())
            .or_else(|| self.screens().iter().map(|screen| screen.refresh()).min())
            .unwrap_or(DEFAULT_REFRESH)
    }

    pub fn decorate_with_style(&self, text: &str) -> String {
        markup::decorate(text, &self.style.decoration())
    }

    /// Caches `content` and asks every attached screen for a redraw, unless
    /// nothing changed. Returns whether screens were notified.
    pub fn update_screens(&self, content: String) -> bool {
        {
            let mut current = self.content.lock();
            if current.as_ref() == Some(&content) {
                return false;
            }
            *current = Some(content);
        }

        for screen in self.screens() {
            screen.update();
        }
        true
    }

    pub fn attach(&self, screen: &Arc<Screen>) {
        let mut screens = self.screens.write();
        if !screens
            .iter()
            .any(|known| std::ptr::eq(known.as_ptr(), Arc::as_ptr(screen)))
        {
            screens.push(Arc::downgrade(screen));
        }
    }

    pub fn screens(&self) -> Vec<Arc<Screen>> {
        self.screens.read().iter().filter_map(Weak::upgrade).collect()
    }

    /// Runs `task` in the background until it ends or the widget stops.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done
                && !e.is_cancelled()
            {
                log::error!("Widget task failed: {e}");
            }
        }
        tasks.spawn(task);
    }

    /// Marks the widget as started. Returns `false` when a start sequence
    /// already ran, or is running.
    pub async fn begin(&self) -> bool {
        let _guard = self.start_lock.lock().await;
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// Serializes recomputes so that an older one never lands last.
    pub async fn compute_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.compute_lock.lock().await
    }

    /// Allows a later start after a background loop ended.
    pub fn finish(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    /// Clears a previous stop so the widget can run again.
    pub fn reset(&self) {
        self.stop.reset();
    }

    pub fn stop(&self) {
        self.stop.stop();
        self.started.store(false, Ordering::SeqCst);
        self.tasks.lock().abort_all();
    }
}

/// A renderable leaf of a screen.
#[async_trait]
pub trait Widget: Send + Sync {
    fn core(&self) -> &WidgetCore;

    /// Produces the first content and starts whatever keeps it fresh. May run
    /// until the widget is stopped.
    async fn start(&self) -> Result<()>;

    fn stop(&self) {
        self.core().stop();
    }

    fn content(&self) -> Option<String> {
        self.core().content()
    }
}

/// Widgets whose content is recomputed on background tasks.
///
/// Every [`ThreadedWidget::update`] spawns a recompute on the widget's task
/// set, which pushes the result to the screens once done. Recomputes run one
/// at a time.
#[async_trait]
pub trait ThreadedWidget: Widget + Sized + 'static {
    /// A strong handle on this widget, if it is still alive.
    fn handle(&self) -> Option<Arc<Self>>;

    /// Fresh content, or `None` when there is nothing to show yet.
    async fn compute(&self) -> Result<Option<String>>;

    fn update(&self) {
        if self.core().stop_signal().is_stopped() {
            return;
        }
        let Some(widget) = self.handle() else {
            return;
        };

        self.core().spawn(async move {
            let _guard = widget.core().compute_guard().await;
            match widget.compute().await {
                Ok(Some(content)) => {
                    widget.core().update_screens(content);
                }
                Ok(None) => {}
                Err(e) => log::error!("Failed to update widget: {e:#}"),
            }
        });
    }

    async fn start_background(&self) {
        if self.core().begin().await {
            self.update();
        }
    }
}
