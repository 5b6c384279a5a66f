use std::time::Instant;

use async_trait::async_trait;
use shared::error::PluginError;

use super::{help_lines, split_action, Action};
use crate::registry::{Plugin, PluginContext};

pub const NAME: &str = "system";

/// Static facts about the running process.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub name: String,
    pub version: String,
    pub mode: String,
}

#[derive(Debug)]
pub struct SystemPlugin {
    info: SystemInfo,
    started: Instant,
}

impl SystemPlugin {
    pub fn new(info: SystemInfo) -> Self {
        Self {
            info,
            started: Instant::now(),
        }
    }

    fn show(&self) -> Vec<String> {
        let uptime = self.started.elapsed().as_secs();
        vec![
            format!("name:    {}", self.info.name),
            format!("version: {}", self.info.version),
            format!("mode:    {}", self.info.mode),
            format!(
                "uptime:  {:02}:{:02}:{:02}",
                uptime / 3600,
                (uptime % 3600) / 60,
                uptime % 60
            ),
        ]
    }
}

#[async_trait]
impl Plugin for SystemPlugin {
    async fn invoke(
        &self,
        _ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        let (action, _) = split_action(args, "system <show|help>")?;
        match action {
            Action::Show => Ok(self.show()),
            Action::Help => Ok(help_lines(NAME, &[("show", "name, version, mode, uptime")])),
            other => Err(PluginError::UnsupportedAction(other.to_string())),
        }
    }

    fn describe(&self) -> &str {
        "process information"
    }
}
