use async_trait::async_trait;
use chrono::Local;
use shared::error::PluginError;

use super::{help_lines, split_action, Action};
use crate::registry::{Plugin, PluginContext};

pub const NAME: &str = "time";

#[derive(Debug, Default)]
pub struct TimePlugin;

#[async_trait]
impl Plugin for TimePlugin {
    async fn invoke(
        &self,
        _ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        let (action, _) = split_action(args, "time <show|help>")?;
        match action {
            Action::Show => Ok(vec![Local::now().format("%Y-%m-%d %H:%M:%S").to_string()]),
            Action::Help => Ok(help_lines(NAME, &[("show", "local wall-clock time")])),
            other => Err(PluginError::UnsupportedAction(other.to_string())),
        }
    }

    fn describe(&self) -> &str {
        "local clock"
    }
}
