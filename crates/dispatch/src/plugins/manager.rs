use async_trait::async_trait;
use shared::{error::PluginError, protocol::Command};
use tokio::sync::Mutex;

use super::{help_lines, parse_key, split_action, Action, Key};
use crate::registry::{Plugin, PluginContext};

pub const NAME: &str = "p";
const USAGE: &str = "p <plugins|panels|help> ...";
const PLUGINS_USAGE: &str = "p plugins <show|help>";
const PANELS_USAGE: &str = "p panels <show|focus|key|help> ...";

/// The `p` namespace: introspection of plugins and panels, plus panel focus
/// and key routing for the GUI.
#[derive(Debug, Default)]
pub struct ManagerPlugin {
    focus: Mutex<Option<String>>,
}

impl ManagerPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn help(&self) -> Vec<String> {
        help_lines(
            NAME,
            &[
                ("plugins show", "list registered plugins and panels"),
                ("panels show", "list panels with their state"),
                ("panels focus <plugin>", "give a panel the key focus"),
                ("panels key <key>", "tab cycles focus, other keys go to it"),
                ("help", "this text"),
            ],
        )
    }

    async fn plugins(
        &self,
        ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        let (action, _) = split_action(args, PLUGINS_USAGE)?;
        match action {
            Action::Show => Ok(self.show_plugins(ctx).await),
            Action::Help => Ok(self.help()),
            other => Err(PluginError::UnsupportedAction(other.to_string())),
        }
    }

    async fn show_plugins(&self, ctx: &PluginContext<'_>) -> Vec<String> {
        let focus = self.focus.lock().await.clone();
        let mut lines = vec!["plugins:".to_string()];
        for name in ctx.registry.names() {
            let about = ctx.registry.describe(name).unwrap_or_default();
            lines.push(format!("  - {name:<8} {about}").trim_end().to_string());
        }
        lines.push("panels:".to_string());
        let panels = ctx.panels.names();
        if panels.is_empty() {
            lines.push("  - <none>".to_string());
        }
        for name in panels {
            let marker = if focus.as_deref() == Some(name.as_str()) {
                " (focus)"
            } else {
                ""
            };
            lines.push(format!("  - {name}{marker}"));
        }
        lines
    }

    async fn panels(
        &self,
        ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        let (action, rest) = split_action(args, PANELS_USAGE)?;
        match action {
            Action::Show => Ok(self.show_panels(ctx).await),
            Action::Focus => self.focus(ctx, rest).await,
            Action::Key => self.key(ctx, rest).await,
            Action::Help => Ok(self.help()),
            other => Err(PluginError::UnsupportedAction(other.to_string())),
        }
    }

    async fn show_panels(&self, ctx: &PluginContext<'_>) -> Vec<String> {
        let focus = self.focus.lock().await.clone();
        ctx.panels
            .snapshot()
            .into_iter()
            .map(|panel| {
                let marker = if focus.as_deref() == Some(panel.plugin_name.as_str()) {
                    '>'
                } else {
                    ' '
                };
                let dirty = if panel.dirty { " (dirty)" } else { "" };
                format!(
                    "{marker} {:<8} {} lines, updated {}{dirty}",
                    panel.plugin_name,
                    panel.rendered_lines.len(),
                    panel.updated_at.format("%H:%M:%S"),
                )
            })
            .collect()
    }

    async fn focus(
        &self,
        ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        let target = args
            .first()
            .ok_or_else(|| PluginError::missing("<plugin>", "p panels focus <plugin>"))?;
        if !ctx.registry.contains(target) {
            return Err(PluginError::invalid("<plugin>", target.as_str()));
        }
        *self.focus.lock().await = Some(target.clone());
        Ok(vec![format!("focus: {target}")])
    }

    async fn key(
        &self,
        ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        let key = parse_key(args, "p panels key <key>")?;
        let mut focus = self.focus.lock().await;

        if key == Key::Tab {
            let candidates: Vec<&str> = ctx.registry.names().filter(|name| *name != NAME).collect();
            let next = match focus.as_deref() {
                Some(current) => candidates
                    .iter()
                    .position(|name| *name == current)
                    .map(|idx| candidates[(idx + 1) % candidates.len()])
                    .or_else(|| candidates.first().copied()),
                None => candidates.first().copied(),
            };
            *focus = next.map(str::to_string);
            return Ok(vec![format!("focus: {}", next.unwrap_or("<none>"))]);
        }

        let Some(target) = focus.clone() else {
            return Ok(vec![format!("no panel has focus; `{key}` ignored")]);
        };
        drop(focus);

        let forwarded = Command::parse(ctx.command.source(), format!("{target} {} {key}", Action::Key))
            .map_err(|err| PluginError::Failed(err.to_string()))?;
        ctx.bus
            .publish(forwarded)
            .map_err(|err| PluginError::Failed(format!("could not forward `{key}`: {err}")))?;
        tracing::debug!(%key, plugin = %target, "forwarded key");
        Ok(vec![format!("forwarded `{key}` to {target}")])
    }
}

#[async_trait]
impl Plugin for ManagerPlugin {
    async fn invoke(
        &self,
        ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        let (target, rest) = args
            .split_first()
            .ok_or_else(|| PluginError::missing("<plugins|panels|help>", USAGE))?;
        match target.as_str() {
            "plugins" => self.plugins(ctx, rest).await,
            "panels" => self.panels(ctx, rest).await,
            "help" => Ok(self.help()),
            other => Err(PluginError::invalid("<plugins|panels|help>", other)),
        }
    }

    fn describe(&self) -> &str {
        "plugin and panel manager"
    }
}
