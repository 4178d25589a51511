use super::{Style, ThreadedWidget, Widget, WidgetCore};
use crate::hooks::{HookEvent, HookKind, Subscriber, xorg};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

const ACTIVE_WINDOW: &str = "_NET_ACTIVE_WINDOW";
const WINDOW_NAME: &str = "_NET_WM_NAME";

/// Cuts `text` after `max` characters, marking the cut with an ellipsis.
/// A zero `max` keeps the whole text.
pub fn truncate_title(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}

/// Title of the focused X window.
pub struct WindowTitleWidget {
    core: WidgetCore,
    max_length: usize,
    window: Mutex<Option<String>>,
    me: Weak<Self>,
}

impl WindowTitleWidget {
    pub fn new(max_length: usize, style: Style) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let core = WidgetCore::new(style, None);
            let subscriber: Weak<dyn Subscriber> = me.clone();
            core.hooks().subscribe(&subscriber, &[HookKind::XorgWindow]);

            Self {
                core,
                max_length,
                window: Mutex::new(None),
                me: me.clone(),
            }
        })
    }

    async fn active_window(&self) -> Result<Option<String>> {
        let known = self.window.lock().clone();
        if known.is_some() {
            return Ok(known);
        }

        let active = xorg::query_property(None, ACTIVE_WINDOW)
            .await?
            .and_then(|event| event.window_id().map(str::to_owned));
        *self.window.lock() = active.clone();
        Ok(active)
    }
}

#[async_trait]
impl Subscriber for WindowTitleWidget {
    async fn notify(&self, event: &HookEvent) -> Result<()> {
        let HookEvent::Window(events) = event else {
            return Ok(());
        };

        if let Some(active) = events.iter().rev().find(|event| event.atom == ACTIVE_WINDOW) {
            log::debug!("Active window changed: {}", active.value);
            *self.window.lock() = active.window_id().map(str::to_owned);
            self.update();
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadedWidget for WindowTitleWidget {
    fn handle(&self) -> Option<Arc<Self>> {
        self.me.upgrade()
    }

    async fn compute(&self) -> Result<Option<String>> {
        let Some(window) = self.active_window().await? else {
            return Ok(Some(String::new()));
        };

        let title = xorg::query_property(Some(&window), WINDOW_NAME)
            .await?
            .and_then(|event| event.text())
            .unwrap_or_default();
        if title.is_empty() {
            return Ok(Some(String::new()));
        }

        Ok(Some(self.core.decorate_with_style(&truncate_title(
            &title,
            self.max_length,
        ))))
    }
}

#[async_trait]
impl Widget for WindowTitleWidget {
    fn core(&self) -> &WidgetCore {
        &self.core
    }

    async fn start(&self) -> Result<()> {
        self.start_background().await;
        Ok(())
    }
}
