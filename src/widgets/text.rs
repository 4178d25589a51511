use super::{Style, Widget, WidgetCore};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Static text, rendered once when started.
pub struct TextWidget {
    core: WidgetCore,
    text: String,
}

impl TextWidget {
    pub fn new(text: impl Into<String>, style: Style) -> Arc<Self> {
        Arc::new(Self {
            core: WidgetCore::new(style, None),
            text: text.into(),
        })
    }

    pub fn update(&self) {
        self.core
            .update_screens(self.core.decorate_with_style(&self.text));
    }
}

#[async_trait]
impl Widget for TextWidget {
    fn core(&self) -> &WidgetCore {
        &self.core
    }

    async fn start(&self) -> Result<()> {
        self.update();
        Ok(())
    }
}
