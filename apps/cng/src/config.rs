use std::{fs, io, path::Path, time::Duration};

use anyhow::Context;
use clap::ValueEnum;
use dispatch::bus::DEFAULT_QUEUE_CAPACITY;
use serde::Deserialize;

/// Which interactive adapter owns the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Cli,
    Gui,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Cli => "cli",
            Mode::Gui => "gui",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub name: String,
    pub web_enabled: bool,
    pub web_bind: String,
    pub queue_capacity: usize,
    pub reply_timeout_ms: u64,
    pub log_filter: String,
    pub log_file: String,
    pub script_cli: String,
    pub script_gui: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: "cng".into(),
            web_enabled: true,
            web_bind: server::DEFAULT_BIND.into(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reply_timeout_ms: 3000,
            log_filter: "info".into(),
            log_file: "cng4.log".into(),
            script_cli: String::new(),
            script_gui: String::new(),
        }
    }
}

impl Settings {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn script_for(&self, mode: Mode) -> &str {
        match mode {
            Mode::Cli => &self.script_cli,
            Mode::Gui => &self.script_gui,
        }
    }
}

#[derive(Debug)]
pub struct LoadedSettings {
    pub settings: Settings,
    /// False when the file did not exist and defaults were used.
    pub from_file: bool,
}

/// Reads `path`, then applies environment overrides. A missing file yields
/// defaults; a file that exists but does not parse is an error.
pub fn load_settings(path: &Path) -> anyhow::Result<LoadedSettings> {
    let (mut settings, from_file) = match fs::read_to_string(path) {
        Ok(raw) => {
            let settings = toml::from_str::<Settings>(&raw)
                .with_context(|| format!("parsing settings file {}", path.display()))?;
            (settings, true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => (Settings::default(), false),
        Err(err) => {
            return Err(err).with_context(|| format!("reading settings file {}", path.display()))
        }
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(LoadedSettings {
        settings,
        from_file,
    })
}

pub fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CNG_WEB_BIND") {
        settings.web_bind = v;
    }
    if let Some(v) = var("APP__WEB_BIND") {
        settings.web_bind = v;
    }

    if let Some(v) = var("APP__QUEUE_CAPACITY") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.queue_capacity = parsed;
        }
    }

    if let Some(v) = var("APP__REPLY_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.reply_timeout_ms = parsed;
        }
    }

    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
