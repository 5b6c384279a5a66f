//! Built-in plugins and the vocabulary they share.

use shared::error::{PluginError, RegistryError};
use strum::{AsRefStr, Display, EnumString};

use crate::registry::PluginRegistryBuilder;

pub mod log;
pub mod manager;
pub mod system;
pub mod time;

pub use self::log::LogPlugin;
pub use self::manager::ManagerPlugin;
pub use self::system::{SystemInfo, SystemPlugin};
pub use self::time::TimePlugin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Help,
    Show,
    Insert,
    Clear,
    Key,
    Focus,
}

/// Keys the GUI adapter forwards to plugins by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Key {
    Tab,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    AltC,
    AltUp,
    AltDown,
    AltLeft,
    AltRight,
    AltW,
    AltS,
    AltA,
    AltD,
    CtrlX,
    CtrlS,
}

/// Splits `args` into the leading action and whatever follows it.
pub(crate) fn split_action<'a>(
    args: &'a [String],
    usage: &str,
) -> Result<(Action, &'a [String]), PluginError> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| PluginError::missing("<action>", usage))?;
    let action = first
        .parse::<Action>()
        .map_err(|_| PluginError::UnsupportedAction(first.clone()))?;
    Ok((action, rest))
}

pub(crate) fn parse_key(args: &[String], usage: &str) -> Result<Key, PluginError> {
    let raw = args
        .first()
        .ok_or_else(|| PluginError::missing("<key>", usage))?;
    raw.parse::<Key>()
        .map_err(|_| PluginError::invalid("<key>", raw.as_str()))
}

pub(crate) fn help_lines(name: &str, actions: &[(&str, &str)]) -> Vec<String> {
    let mut lines = vec![format!("{name} help")];
    lines.extend(
        actions
            .iter()
            .map(|(usage, about)| format!("  {name} {usage:<24} {about}")),
    );
    lines
}

/// Registers `p`, `log`, `system` and `time`.
pub fn register_builtins(
    builder: &mut PluginRegistryBuilder,
    info: SystemInfo,
) -> Result<(), RegistryError> {
    builder.register(self::manager::NAME, ManagerPlugin::new())?;
    builder.register(self::log::NAME, LogPlugin::new())?;
    builder.register(self::system::NAME, SystemPlugin::new(info))?;
    builder.register(self::time::NAME, TimePlugin)?;
    Ok(())
}

#[cfg(test)]
#[path = "../tests/plugins_tests.rs"]
mod tests;
