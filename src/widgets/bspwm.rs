//! bspwm desktop widgets.

use super::{Style, ThreadedWidget, Widget, WidgetCore};
use crate::{
    hooks::{
        HookEvent, HookKind, MonitorTopology, Subscriber,
        bspwm::{Desktop, DesktopState, Monitor},
    },
    markup::{self, Decoration},
};
use anyhow::Result;
use async_trait::async_trait;
use itertools::Itertools;
use parking_lot::Mutex;
use serde::Deserialize;
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

pub const DEFAULT_BSPC: &str = "bspc";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ColorPair {
    pub fg: Option<String>,
    pub bg: Option<String>,
}

impl ColorPair {
    fn decoration(&self) -> Decoration<'_> {
        Decoration {
            fg: self.fg.as_deref(),
            bg: self.bg.as_deref(),
            ..Default::default()
        }
    }
}

/// Colors for every desktop state, focused or not, and for monitor labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DesktopPalette {
    pub occupied: ColorPair,
    pub free: ColorPair,
    pub urgent: ColorPair,
    pub monitor: ColorPair,
    pub focused_occupied: ColorPair,
    pub focused_free: ColorPair,
    pub focused_urgent: ColorPair,
    pub focused_monitor: ColorPair,
}

impl DesktopPalette {
    pub fn desktop(&self, desktop: &Desktop) -> &ColorPair {
        match (desktop.state, desktop.focused) {
            (DesktopState::Occupied, true) => &self.focused_occupied,
            (DesktopState::Occupied, false) => &self.occupied,
            (DesktopState::Free, true) => &self.focused_free,
            (DesktopState::Free, false) => &self.free,
            (DesktopState::Urgent, true) => &self.focused_urgent,
            (DesktopState::Urgent, false) => &self.urgent,
        }
    }

    pub fn monitor(&self, focused: bool) -> &ColorPair {
        if focused {
            &self.focused_monitor
        } else {
            &self.monitor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BspwmOptions {
    pub palette: DesktopPalette,
    /// Desktop name prefixes, in display order.
    pub fixed_order: Vec<String>,
    pub bspc: String,
}

impl Default for BspwmOptions {
    fn default() -> Self {
        Self {
            palette: DesktopPalette::default(),
            fixed_order: Vec::new(),
            bspc: DEFAULT_BSPC.to_owned(),
        }
    }
}

/// Turns a topology snapshot into clickable monitor and desktop segments.
#[derive(Debug, Clone)]
pub struct DesktopRenderer {
    options: BspwmOptions,
    padding: usize,
}

impl DesktopRenderer {
    pub fn new(options: BspwmOptions, padding: usize) -> Self {
        Self { options, padding }
    }

    pub fn hook_kind(&self) -> HookKind {
        HookKind::Bspwm {
            bspc: self.options.bspc.clone(),
        }
    }

    pub fn focus_desktop(&self, desktop: &str) -> String {
        format!("{} desktop -f \"{desktop}\"", self.options.bspc)
    }

    pub fn focus_monitor(&self, monitor: &str) -> String {
        format!("{} monitor -f \"{monitor}\"", self.options.bspc)
    }

    /// Swaps `desktop` with `target`.
    pub fn swap_desktop(&self, desktop: &str, target: &str) -> String {
        format!("{} desktop \"{desktop}\" -s \"{target}\"", self.options.bspc)
    }

    /// Padding glyph, text and padding glyph, each with the same colors,
    /// behind a single left click action.
    pub fn segment(&self, text: &str, colors: &ColorPair, action: &str) -> String {
        let decoration = colors.decoration();
        let pad = " ".repeat(self.padding);

        let mut inner = String::new();
        if self.padding > 0 {
            inner.push_str(&markup::decorate(&pad, &decoration));
        }
        inner.push_str(&markup::decorate(text, &decoration));
        if self.padding > 0 {
            inner.push_str(&markup::decorate(&pad, &decoration));
        }

        markup::clickable(action, &inner)
    }

    /// Position of the longest `fixed_order` pattern prefixing `name`. Names
    /// matching nothing come after every pattern.
    pub fn order_key(&self, name: &str) -> usize {
        self.options
            .fixed_order
            .iter()
            .enumerate()
            .filter(|(_, pattern)| name.starts_with(pattern.as_str()))
            .max_by(|(a_index, a), (b_index, b)| {
                a.len().cmp(&b.len()).then(b_index.cmp(a_index))
            })
            .map_or(self.options.fixed_order.len(), |(index, _)| index)
    }

    pub fn sort_fixed_order<'a>(&self, desktops: &'a [Desktop]) -> Vec<&'a Desktop> {
        desktops
            .iter()
            .sorted_by_key(|desktop| self.order_key(&desktop.name))
            .collect()
    }

    pub fn render<F>(&self, topology: &MonitorTopology, desktop_action: F) -> String
    where
        F: Fn(&Desktop, &Monitor) -> String,
    {
        let palette = &self.options.palette;
        let mut out = String::new();

        for monitor in &topology.monitors {
            out.push_str(&self.segment(
                &monitor.name,
                palette.monitor(monitor.focused),
                &self.focus_monitor(&monitor.name),
            ));
            for desktop in self.sort_fixed_order(&monitor.desktops) {
                out.push_str(&self.segment(
                    &desktop.name,
                    palette.desktop(desktop),
                    &desktop_action(desktop, monitor),
                ));
            }
        }

        out
    }
}

/// Monitors and desktops of the whole bspwm session.
pub struct BspwmDesktopWidget {
    core: WidgetCore,
    renderer: DesktopRenderer,
    topology: Mutex<Option<MonitorTopology>>,
    me: Weak<Self>,
}

impl BspwmDesktopWidget {
    pub fn new(options: BspwmOptions, style: Style, refresh: Option<Duration>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let core = WidgetCore::new(style, refresh);
            let renderer = DesktopRenderer::new(options, core.style().padding);

            let subscriber: Weak<dyn Subscriber> = me.clone();
            core.hooks().subscribe(&subscriber, &[renderer.hook_kind()]);

            Self {
                core,
                renderer,
                topology: Mutex::new(None),
                me: me.clone(),
            }
        })
    }

    pub fn renderer(&self) -> &DesktopRenderer {
        &self.renderer
    }
}

#[async_trait]
impl Subscriber for BspwmDesktopWidget {
    async fn notify(&self, event: &HookEvent) -> Result<()> {
        if let HookEvent::Bspwm(topology) = event {
            *self.topology.lock() = Some(topology.clone());
            self.update();
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadedWidget for BspwmDesktopWidget {
    fn handle(&self) -> Option<Arc<Self>> {
        self.me.upgrade()
    }

    async fn compute(&self) -> Result<Option<String>> {
        let topology = self.topology.lock().clone();
        Ok(topology.map(|topology| {
            self.renderer.render(&topology, |desktop, _| {
                self.renderer.focus_desktop(&desktop.name)
            })
        }))
    }
}

#[async_trait]
impl Widget for BspwmDesktopWidget {
    fn core(&self) -> &WidgetCore {
        &self.core
    }

    async fn start(&self) -> Result<()> {
        self.start_background().await;
        Ok(())
    }
}

/// Desktop widget for setups where desktops are shared between monitors.
///
/// Clicking a desktop living on another monitor swaps it with the desktop
/// currently focused on the monitor of this widget's screen, instead of
/// moving the focus away.
pub struct BspwmDesktopPoolWidget {
    core: WidgetCore,
    renderer: DesktopRenderer,
    topology: Mutex<Option<MonitorTopology>>,
    /// Last desktop seen focused, per monitor.
    focused: Mutex<HashMap<String, String>>,
    me: Weak<Self>,
}

impl BspwmDesktopPoolWidget {
    pub fn new(options: BspwmOptions, style: Style, refresh: Option<Duration>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let core = WidgetCore::new(style, refresh);
            let renderer = DesktopRenderer::new(options, core.style().padding);

            let subscriber: Weak<dyn Subscriber> = me.clone();
            core.hooks().subscribe(&subscriber, &[renderer.hook_kind()]);

            Self {
                core,
                renderer,
                topology: Mutex::new(None),
                focused: Mutex::new(HashMap::new()),
                me: me.clone(),
            }
        })
    }

    pub fn record_focus(&self, topology: &MonitorTopology) {
        let mut focused = self.focused.lock();
        for monitor in &topology.monitors {
            if let Some(desktop) = monitor.focused_desktop() {
                focused.insert(monitor.name.clone(), desktop.name.clone());
            }
        }
    }

    /// bspwm name of the monitor showing this widget.
    pub fn attaching_monitor(&self) -> Option<String> {
        self.core
            .screens()
            .first()
            .and_then(|screen| screen.bspwm_monitor_name())
    }

    pub fn desktop_action(
        &self,
        desktop: &str,
        desktop_monitor: &str,
        screen_monitor: Option<&str>,
    ) -> String {
        if let Some(screen_monitor) = screen_monitor
            && screen_monitor != desktop_monitor
            && let Some(target) = self.focused.lock().get(screen_monitor)
        {
            return self.renderer.swap_desktop(desktop, target);
        }
        self.renderer.focus_desktop(desktop)
    }
}

#[async_trait]
impl Subscriber for BspwmDesktopPoolWidget {
    async fn notify(&self, event: &HookEvent) -> Result<()> {
        if let HookEvent::Bspwm(topology) = event {
            self.record_focus(topology);
            *self.topology.lock() = Some(topology.clone());
            self.update();
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadedWidget for BspwmDesktopPoolWidget {
    fn handle(&self) -> Option<Arc<Self>> {
        self.me.upgrade()
    }

    async fn compute(&self) -> Result<Option<String>> {
        let topology = self.topology.lock().clone();
        let screen_monitor = self.attaching_monitor();

        Ok(topology.map(|topology| {
            self.renderer.render(&topology, |desktop, monitor| {
                self.desktop_action(&desktop.name, &monitor.name, screen_monitor.as_deref())
            })
        }))
    }
}

#[async_trait]
impl Widget for BspwmDesktopPoolWidget {
    fn core(&self) -> &WidgetCore {
        &self.core
    }

    async fn start(&self) -> Result<()> {
        self.start_background().await;
        Ok(())
    }
}
