use crate::{
    bar::{BarCommand, BarOutput, BarSpawner, lemonbar::DEFAULT_PROGRAM},
    hooks::HooksPool,
    markup::Alignment,
    outputs::{self, Geometry},
    panel::Panel,
    widgets::{DEFAULT_REFRESH, Widget},
};
use anyhow::Result;
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::task::JoinSet;

/// Per screen settings. Unset attributes are inherited from the panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenSettings {
    /// xrandr output name.
    pub name: Option<String>,
    /// Monitor name used by bspwm, when it differs from the output name.
    pub bspwm_monitor_name: Option<String>,
    pub geometry: Option<Geometry>,
    pub height: Option<u32>,
    pub fg: Option<String>,
    pub bg: Option<String>,
    pub fonts: Option<Vec<String>>,
    pub refresh: Option<Duration>,
    pub clickable: Option<u32>,
    /// Start the hooks of this screen's widgets from the screen itself.
    pub listen_hooks: bool,
}

/// Local value if set, else the inherited one.
pub fn resolve<T: Clone>(local: &Option<T>, inherited: impl FnOnce() -> Option<T>) -> Option<T> {
    local.clone().or_else(inherited)
}

#[derive(Default)]
struct Zones {
    left: Vec<Arc<dyn Widget>>,
    center: Vec<Arc<dyn Widget>>,
    right: Vec<Arc<dyn Widget>>,
}

impl Zones {
    fn get(&self, alignment: Alignment) -> &Vec<Arc<dyn Widget>> {
        match alignment {
            Alignment::Left => &self.left,
            Alignment::Center => &self.center,
            Alignment::Right => &self.right,
        }
    }

    fn get_mut(&mut self, alignment: Alignment) -> &mut Vec<Arc<dyn Widget>> {
        match alignment {
            Alignment::Left => &mut self.left,
            Alignment::Center => &mut self.center,
            Alignment::Right => &mut self.right,
        }
    }

    fn all(&self) -> Vec<Arc<dyn Widget>> {
        Alignment::ALL
            .iter()
            .flat_map(|alignment| self.get(*alignment).iter().cloned())
            .collect()
    }
}

/// One monitor of the panel: three zones of widgets.
pub struct Screen {
    settings: ScreenSettings,
    geometry: Mutex<Option<Geometry>>,
    widgets: RwLock<Zones>,
    panel: RwLock<Weak<Panel>>,
    hooks: Arc<HooksPool>,
    spawner: BarSpawner,
}

impl Screen {
    pub fn new(settings: ScreenSettings) -> Arc<Self> {
        Arc::new(Self {
            geometry: Mutex::new(settings.geometry),
            settings,
            widgets: RwLock::new(Zones::default()),
            panel: RwLock::new(Weak::new()),
            hooks: HooksPool::new(),
            spawner: BarSpawner::new(),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.settings.name.as_deref()
    }

    pub fn bspwm_monitor_name(&self) -> Option<String> {
        resolve(&self.settings.bspwm_monitor_name, || self.settings.name.clone())
    }

    pub fn hooks(&self) -> &Arc<HooksPool> {
        &self.hooks
    }

    pub fn panel(&self) -> Option<Arc<Panel>> {
        self.panel.read().upgrade()
    }

    pub(crate) fn set_panel(&self, panel: &Arc<Panel>) {
        *self.panel.write() = Arc::downgrade(panel);
    }

    /// Last content pushed by this screen's own bar.
    pub fn content(&self) -> Option<String> {
        self.spawner.content()
    }

    pub fn height(&self) -> Option<u32> {
        resolve(&self.settings.height, || {
            self.panel().and_then(|panel| panel.settings().height)
        })
    }

    pub fn fg(&self) -> Option<String> {
        resolve(&self.settings.fg, || {
            self.panel().and_then(|panel| panel.settings().fg.clone())
        })
    }

    pub fn bg(&self) -> Option<String> {
        resolve(&self.settings.bg, || {
            self.panel().and_then(|panel| panel.settings().bg.clone())
        })
    }

    pub fn fonts(&self) -> Vec<String> {
        resolve(&self.settings.fonts, || {
            self.panel().map(|panel| panel.settings().fonts.clone())
        })
        .unwrap_or_default()
    }

    pub fn refresh(&self) -> Duration {
        resolve(
            &self.settings.refresh.filter(|refresh| !refresh.is_zero()),
            || self.panel().map(|panel| panel.settings().refresh),
        )
        .unwrap_or(DEFAULT_REFRESH)
    }

    pub fn clickable(&self) -> Option<u32> {
        resolve(&self.settings.clickable, || {
            self.panel().and_then(|panel| panel.settings().clickable)
        })
    }

    /// Screens without a panel draw their own bar.
    pub fn instance_per_screen(&self) -> bool {
        self.panel()
            .is_none_or(|panel| panel.settings().instance_per_screen)
    }

    /// Inserts `widgets` before `index`, or appends them.
    pub fn add_widget<I>(self: &Arc<Self>, alignment: Alignment, widgets: I, index: Option<usize>)
    where
        I: IntoIterator<Item = Arc<dyn Widget>>,
    {
        let widgets: Vec<_> = widgets.into_iter().collect();
        {
            let mut zones = self.widgets.write();
            let zone = zones.get_mut(alignment);
            let at = index.map_or(zone.len(), |index| index.min(zone.len()));
            zone.splice(at..at, widgets.iter().cloned());
        }

        for widget in &widgets {
            let core = widget.core();
            core.attach(self);
            self.hooks.merge(&[core.hooks()]);
            core.hooks().add_parent(&self.hooks);
        }
    }

    pub fn widgets(&self) -> Vec<Arc<dyn Widget>> {
        self.widgets.read().all()
    }

    /// Markup of every non empty zone, each behind its alignment tag.
    pub fn gather(&self) -> String {
        let zones = self.widgets.read();
        Alignment::ALL
            .iter()
            .filter_map(|alignment| {
                let widgets = zones.get(*alignment);
                (!widgets.is_empty()).then(|| {
                    format!(
                        "{}{}",
                        alignment.tag(),
                        widgets.iter().filter_map(|widget| widget.content()).join("")
                    )
                })
            })
            .join("")
    }

    /// Explicit geometry, or the one of the output named like this screen.
    pub async fn geometry(&self) -> Option<Geometry> {
        let known = *self.geometry.lock();
        if known.is_some() {
            return known;
        }

        let name = self.name()?;
        match outputs::query_geometry(name).await {
            Ok(mut geometry) => {
                if let Some(height) = self.height() {
                    geometry.height = height;
                }
                *self.geometry.lock() = Some(geometry);
                Some(geometry)
            }
            Err(e) => {
                log::error!(
                    "Geometry of screen {name} could not be fetched, set it in the configuration: {e:#}"
                );
                None
            }
        }
    }

    pub async fn bar_command(&self) -> BarCommand {
        let panel = self.panel();
        BarCommand {
            program: panel
                .as_ref()
                .map_or_else(|| DEFAULT_PROGRAM.to_owned(), |panel| panel.settings().program.clone()),
            geometry: BarCommand::geometry_arg(self.geometry().await, self.height()),
            fonts: self.fonts(),
            fg: self.fg(),
            bg: self.bg(),
            clickable: self.clickable(),
            extra_args: panel
                .map(|panel| panel.settings().extra_args.clone())
                .unwrap_or_default(),
        }
    }

    async fn output(&self) -> BarOutput {
        match self.panel().and_then(|panel| panel.redirect()) {
            Some(tx) => BarOutput::Channel(tx),
            None => BarOutput::Lemonbar(self.bar_command().await),
        }
    }

    /// Requests a redraw from whoever draws this screen.
    pub fn update(&self) {
        match self.panel() {
            Some(panel) if !panel.settings().instance_per_screen => panel.update(),
            _ => self.spawner.update(),
        }
    }

    /// Clears a previous stop of this screen and its widgets. A stop
    /// requested after this call and before [`Screen::start`] is kept.
    pub fn reset(&self) {
        self.spawner.stop_signal().reset();
        for widget in self.widgets() {
            widget.core().reset();
        }
    }

    /// Starts every widget and, in per screen mode, this screen's bar. Runs
    /// until the screen is stopped, and returns right away if it already was.
    pub async fn start(&self) -> Result<()> {
        if self.settings.listen_hooks {
            self.hooks.listen();
        }

        let widgets = self.widgets();
        let per_screen = self.instance_per_screen();
        if !per_screen && widgets.is_empty() {
            self.spawner.set_content(Some(String::new()));
            self.stop();
            return Ok(());
        }

        let mut running = JoinSet::new();
        for widget in widgets {
            running.spawn(async move {
                if let Err(e) = widget.start().await {
                    log::error!("Widget failed: {e:#}");
                }
            });
        }

        if per_screen {
            let output = self.output().await;
            if let Err(e) = self
                .spawner
                .run(output, self.refresh(), || self.gather())
                .await
            {
                log::error!("Bar of screen {} failed: {e:#}", self.label());
                self.spawner.stop_signal().wait().await;
            }
        } else {
            self.update();
            self.spawner.stop_signal().wait().await;
        }

        while let Some(done) = running.join_next().await {
            if let Err(e) = done {
                log::error!("Widget task failed: {e}");
            }
        }
        if self.settings.listen_hooks {
            self.hooks.join().await;
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.spawner.stop_signal().stop();
        if self.hooks.is_listening() {
            self.hooks.stop();
        }
        for widget in self.widgets() {
            widget.stop();
        }
    }

    fn label(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }
}
