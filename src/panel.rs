use crate::{
    bar::{BarCommand, BarOutput, BarSpawner, lemonbar::DEFAULT_PROGRAM},
    hooks::HooksPool,
    outputs::{self, Geometry},
    screen::Screen,
};
use anyhow::{Context, Result};
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::mpsc::UnboundedSender, task::JoinSet};
use tokio_stream::StreamExt;

pub const DEFAULT_REFRESH: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSettings {
    /// Minimum delay between two redraws.
    pub refresh: Duration,
    pub height: Option<u32>,
    pub fg: Option<String>,
    pub bg: Option<String>,
    pub fonts: Vec<String>,
    pub clickable: Option<u32>,
    /// One bar process per screen instead of a shared one.
    pub instance_per_screen: bool,
    pub program: String,
    pub extra_args: Vec<String>,
    /// Geometry of the shared bar.
    pub geometry: Option<Geometry>,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            refresh: DEFAULT_REFRESH,
            height: None,
            fg: None,
            bg: None,
            fonts: Vec::new(),
            clickable: None,
            instance_per_screen: false,
            program: DEFAULT_PROGRAM.to_owned(),
            extra_args: Vec::new(),
            geometry: None,
        }
    }
}

/// Root of the bar: owns the screens and drives their lifecycle.
pub struct Panel {
    settings: PanelSettings,
    screens: RwLock<Vec<Arc<Screen>>>,
    hooks: Arc<HooksPool>,
    spawner: BarSpawner,
    redirect: Mutex<Option<UnboundedSender<String>>>,
    /// Output index used by the bar for each output name.
    output_order: RwLock<HashMap<String, usize>>,
}

impl Panel {
    pub fn new(settings: PanelSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            screens: RwLock::new(Vec::new()),
            hooks: HooksPool::new(),
            spawner: BarSpawner::new(),
            redirect: Mutex::new(None),
            output_order: RwLock::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &PanelSettings {
        &self.settings
    }

    pub fn hooks(&self) -> &Arc<HooksPool> {
        &self.hooks
    }

    /// Inserts `screens` before `index`, or appends them.
    pub fn add_screen<I>(self: &Arc<Self>, screens: I, index: Option<usize>)
    where
        I: IntoIterator<Item = Arc<Screen>>,
    {
        let screens: Vec<_> = screens.into_iter().collect();
        {
            let mut known = self.screens.write();
            let at = index.map_or(known.len(), |index| index.min(known.len()));
            known.splice(at..at, screens.iter().cloned());
        }

        for screen in &screens {
            screen.set_panel(self);
            screen.hooks().add_parent(&self.hooks);
            self.hooks.merge(&[screen.hooks()]);
        }
    }

    pub fn screens(&self) -> Vec<Arc<Screen>> {
        self.screens.read().clone()
    }

    /// Sends every rendered line to `tx` instead of spawning bar processes.
    pub fn redirect_output(&self, tx: UnboundedSender<String>) {
        *self.redirect.lock() = Some(tx);
    }

    pub fn redirect(&self) -> Option<UnboundedSender<String>> {
        self.redirect.lock().clone()
    }

    /// Requests a redraw of the shared bar.
    pub fn update(&self) {
        self.spawner.update();
    }

    /// Markup of every screen, each behind its output selector.
    pub fn gather(&self) -> String {
        let order = self.output_order.read();
        self.screens
            .read()
            .iter()
            .enumerate()
            .filter_map(|(position, screen)| {
                let content = screen.gather();
                if content.is_empty() {
                    return None;
                }
                let index = screen
                    .name()
                    .and_then(|name| order.get(name).copied())
                    .unwrap_or(position);
                Some(format!("%{{S{index}}}{content}"))
            })
            .join("")
    }

    /// Lemonbar numbers outputs from left to right.
    async fn load_output_order(&self) {
        match outputs::query_outputs().await {
            Ok(outputs) => {
                *self.output_order.write() = outputs
                    .into_iter()
                    .sorted_by_key(|(_, geometry)| (geometry.x, geometry.y))
                    .enumerate()
                    .map(|(index, (name, _))| (name, index))
                    .collect();
            }
            Err(e) => log::warn!("Using screen order as output order: {e:#}"),
        }
    }

    fn output(&self) -> BarOutput {
        match self.redirect() {
            Some(tx) => BarOutput::Channel(tx),
            None => BarOutput::Lemonbar(BarCommand {
                program: self.settings.program.clone(),
                geometry: BarCommand::geometry_arg(self.settings.geometry, self.settings.height),
                fonts: self.settings.fonts.clone(),
                fg: self.settings.fg.clone(),
                bg: self.settings.bg.clone(),
                clickable: self.settings.clickable,
                extra_args: self.settings.extra_args.clone(),
            }),
        }
    }

    /// Runs the whole panel until [`Panel::stop`] is called or a termination
    /// signal is received.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.spawner.stop_signal().reset();

        let signals =
            Signals::new([SIGTERM, SIGINT, SIGHUP]).context("Failed to register signal handlers")?;
        let signals_handle = signals.handle();
        let signals_task = tokio::spawn({
            let panel = Arc::downgrade(self);
            let mut signals = signals;
            async move {
                while let Some(signal) = signals.next().await {
                    log::info!("Received signal {signal}, stopping");
                    match panel.upgrade() {
                        Some(panel) => panel.stop(),
                        None => break,
                    }
                }
            }
        });

        self.hooks.listen();

        let shared = !self.settings.instance_per_screen;
        if shared && self.redirect().is_none() {
            self.load_output_order().await;
        }

        let screens = self.screens();
        for screen in &screens {
            screen.reset();
        }
        let mut running = JoinSet::new();
        for screen in screens {
            running.spawn(async move {
                if let Err(e) = screen.start().await {
                    log::error!("Screen failed: {e:#}");
                }
            });
        }

        if shared {
            let output = self.output();
            if let Err(e) = self
                .spawner
                .run(output, self.settings.refresh, || self.gather())
                .await
            {
                log::error!("Bar failed: {e:#}");
                self.spawner.stop_signal().wait().await;
            }
        } else {
            self.spawner.stop_signal().wait().await;
        }

        log::info!("Stopping panel");
        for screen in self.screens() {
            screen.stop();
        }
        while let Some(done) = running.join_next().await {
            if let Err(e) = done {
                log::error!("Screen task failed: {e}");
            }
        }

        self.hooks.stop();
        self.hooks.join().await;

        signals_handle.close();
        if let Err(e) = signals_task.await {
            log::error!("Signal handler failed: {e}");
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.spawner.stop_signal().stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        markup::Alignment,
        screen::ScreenSettings,
        widgets::{Style, TextWidget, Widget},
    };
    use tokio::sync::mpsc;

    fn screen(name: &str) -> Arc<Screen> {
        Screen::new(ScreenSettings {
            name: Some(name.into()),
            ..Default::default()
        })
    }

    fn text(content: &str) -> Arc<dyn Widget> {
        TextWidget::new(content, Style::default())
    }

    async fn receive_until(rx: &mut mpsc::UnboundedReceiver<String>, expected: &str) -> bool {
        let wait = async {
            while let Some(line) = rx.recv().await {
                if line == expected {
                    return true;
                }
            }
            false
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap_or(false)
    }

    #[test]
    fn screens_are_inserted_at_index() {
        let panel = Panel::new(PanelSettings::default());
        panel.add_screen([screen("a"), screen("c")], None);
        panel.add_screen([screen("b")], Some(1));
        panel.add_screen([screen("z")], Some(0));

        let names: Vec<_> = panel
            .screens()
            .iter()
            .map(|screen| screen.name().unwrap_or_default().to_owned())
            .collect();
        assert_eq!(names, vec!["z", "a", "b", "c"]);
        assert!(panel.screens()[0].panel().is_some());
    }

    #[test]
    fn screen_subscriptions_reach_the_panel_pool() {
        let panel = Panel::new(PanelSettings::default());
        let screen = screen("HDMI-0");
        panel.add_screen([screen.clone()], None);

        let widget = crate::widgets::WindowTitleWidget::new(0, Style::default());
        screen.add_widget(Alignment::Left, [widget as Arc<dyn Widget>], None);

        assert!(
            panel
                .hooks()
                .hook(&crate::hooks::HookKind::XorgWindow)
                .is_some()
        );
    }

    #[tokio::test]
    async fn shared_bar_gathers_every_screen() {
        let panel = Panel::new(PanelSettings {
            refresh: Duration::from_millis(5),
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        panel.redirect_output(tx);

        let first = screen("HDMI-0");
        let empty = screen("DVI-D-0");
        let last = screen("DP-1");
        first.add_widget(Alignment::Left, [text("a"), text("b")], None);
        last.add_widget(Alignment::Right, [text("z")], None);
        panel.add_screen([first, empty, last], None);

        let running = {
            let panel = panel.clone();
            tokio::spawn(async move { panel.start().await })
        };

        assert!(receive_until(&mut rx, "%{S0}%{l}ab%{S2}%{r}z").await);

        panel.stop();
        panel.stop();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stop_during_startup_ends_the_panel() {
        let panel = Panel::new(PanelSettings {
            refresh: Duration::from_millis(5),
            instance_per_screen: true,
            ..Default::default()
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        panel.redirect_output(tx);

        let screen = screen("HDMI-0");
        screen.add_widget(Alignment::Left, [text("a")], None);
        panel.add_screen([screen.clone()], None);

        let running = {
            let panel = panel.clone();
            tokio::spawn(async move { panel.start().await })
        };
        let stopping = async {
            while !running.is_finished() {
                panel.stop();
                tokio::task::yield_now().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), stopping)
            .await
            .unwrap();
        running.await.unwrap().unwrap();
        assert!(screen.widgets().iter().all(|w| w.core().stop_signal().is_stopped()));
    }

    #[tokio::test]
    async fn one_bar_per_screen() {
        let panel = Panel::new(PanelSettings {
            refresh: Duration::from_millis(5),
            instance_per_screen: true,
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        panel.redirect_output(tx);

        let left = screen("HDMI-0");
        let right = screen("DP-1");
        left.add_widget(Alignment::Left, [text("left")], None);
        right.add_widget(Alignment::Center, [text("right")], None);
        panel.add_screen([left.clone(), right.clone()], None);

        let running = {
            let panel = panel.clone();
            tokio::spawn(async move { panel.start().await })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while (left.content().as_deref() != Some("%{l}left")
            || right.content().as_deref() != Some("%{c}right"))
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(left.content().as_deref(), Some("%{l}left"));
        assert_eq!(right.content().as_deref(), Some("%{c}right"));
        assert!(rx.try_recv().is_ok());

        panel.stop();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
