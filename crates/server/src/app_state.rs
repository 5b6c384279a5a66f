use std::time::Duration;

use dispatch::{CommandBus, PanelStore};

/// Everything a request handler needs; shared behind an `Arc` by the router.
#[derive(Debug, Clone)]
pub struct AppState {
    pub name: String,
    pub bus: CommandBus,
    pub panels: PanelStore,
    pub reply_timeout: Duration,
}

impl AppState {
    pub fn new(
        name: impl Into<String>,
        bus: CommandBus,
        panels: PanelStore,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            bus,
            panels,
            reply_timeout,
        }
    }
}
