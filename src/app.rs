use crate::{
    config::{self, Config, ConfigError, ScreenConfig, WidgetConfig, WidgetKind},
    panel::{Panel, PanelSettings},
    screen::{Screen, ScreenSettings},
    widgets::{
        BspwmDesktopPoolWidget, BspwmDesktopWidget, SubprocessWidget, TextWidget,
        WindowTitleWidget, Widget,
    },
};
use std::sync::Arc;

pub fn build_widget(config: &WidgetConfig) -> Result<Arc<dyn Widget>, ConfigError> {
    let style = config.style.to_style()?;
    let refresh = config::seconds(config.refresh)?;

    let widget: Arc<dyn Widget> = match &config.kind {
        WidgetKind::Text { text } => TextWidget::new(text.clone(), style),
        WidgetKind::Subprocess { command } => SubprocessWidget::new(command.clone(), style, refresh),
        WidgetKind::BspwmDesktop(bspwm) => {
            BspwmDesktopWidget::new(bspwm.clone().into(), style, refresh)
        }
        WidgetKind::BspwmDesktopPool(bspwm) => {
            BspwmDesktopPoolWidget::new(bspwm.clone().into(), style, refresh)
        }
        WidgetKind::WindowTitle { max_length } => WindowTitleWidget::new(*max_length, style),
    };
    Ok(widget)
}

pub fn build_screen(config: &ScreenConfig) -> Result<Arc<Screen>, ConfigError> {
    let screen = Screen::new(ScreenSettings {
        name: config.name.clone(),
        bspwm_monitor_name: config.bspwm_monitor_name.clone(),
        geometry: config.geometry,
        height: config.height,
        fg: config.fg.clone(),
        bg: config.bg.clone(),
        fonts: config.fonts.clone(),
        refresh: config::seconds(config.refresh)?,
        clickable: config.clickable,
        listen_hooks: config.listen_hooks,
    });

    for widget in &config.widgets {
        screen.add_widget(widget.alignment, [build_widget(widget)?], None);
    }
    Ok(screen)
}

/// Builds the whole panel graph described by `config`.
pub fn build_panel(config: &Config) -> Result<Arc<Panel>, ConfigError> {
    let panel_config = &config.panel;
    let panel = Panel::new(PanelSettings {
        refresh: config::seconds(Some(panel_config.refresh))?.unwrap_or_default(),
        height: panel_config.height,
        fg: panel_config.fg.clone(),
        bg: panel_config.bg.clone(),
        fonts: panel_config.fonts.clone(),
        clickable: panel_config.clickable,
        instance_per_screen: panel_config.instance_per_screen,
        program: panel_config.program.clone(),
        extra_args: panel_config.extra_args.clone(),
        geometry: panel_config.geometry,
    });

    let screens = config
        .screens
        .iter()
        .map(build_screen)
        .collect::<Result<Vec<_>, _>>()?;
    if screens.is_empty() {
        log::warn!("No screen configured, the bar will stay empty");
    }
    panel.add_screen(screens, None);

    Ok(panel)
}
