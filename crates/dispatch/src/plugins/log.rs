use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Local;
use shared::error::PluginError;
use tokio::sync::Mutex;

use super::{help_lines, parse_key, split_action, Action, Key};
use crate::registry::{Plugin, PluginContext};

pub const NAME: &str = "log";
pub const LOG_CAPACITY: usize = 1000;
pub const VIEW_LINES: usize = 50;
const USAGE: &str = "log <insert|clear|show|key|help> ...";
const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Default)]
struct LogBuffer {
    lines: VecDeque<String>,
    /// Lines scrolled up from the bottom.
    offset: usize,
}

impl LogBuffer {
    fn push(&mut self, line: String) {
        if self.lines.len() == LOG_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn max_offset(&self) -> usize {
        self.lines.len().saturating_sub(VIEW_LINES)
    }

    fn scroll(&mut self, key: Key) {
        self.offset = match key {
            Key::Up => (self.offset + 1).min(self.max_offset()),
            Key::Down => self.offset.saturating_sub(1),
            Key::Home => self.max_offset(),
            Key::End => 0,
            _ => self.offset,
        };
    }

    fn view(&self) -> Vec<String> {
        let end = self.lines.len() - self.offset.min(self.lines.len());
        let start = end.saturating_sub(VIEW_LINES);
        self.lines.range(start..end).cloned().collect()
    }
}

/// Scrollable in-memory log panel, capped at [`LOG_CAPACITY`] lines.
#[derive(Debug, Default)]
pub struct LogPlugin {
    buffer: Mutex<LogBuffer>,
}

impl LogPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, ctx: &PluginContext<'_>, args: &[String]) -> Result<Vec<String>, PluginError> {
        let (level, words) = args
            .split_first()
            .ok_or_else(|| PluginError::missing("<level> <message>", "log insert <level> <message...>"))?;
        let level = level.to_ascii_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(PluginError::invalid("<level>", level));
        }

        let stamp = ctx.command.received_at().with_timezone(&Local).format("%H:%M:%S");
        let source = ctx.command.source();
        let mut buffer = self.buffer.lock().await;
        buffer.push(format!(
            "{stamp} {source:>6}: [{}] {}",
            level.to_ascii_uppercase(),
            words.join(" ")
        ));
        buffer.offset = 0;
        Ok(buffer.view())
    }
}

#[async_trait]
impl Plugin for LogPlugin {
    async fn invoke(
        &self,
        ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        let (action, rest) = split_action(args, USAGE)?;
        match action {
            Action::Insert => self.insert(ctx, rest).await,
            Action::Clear => {
                *self.buffer.lock().await = LogBuffer::default();
                Ok(Vec::new())
            }
            Action::Show => Ok(self.buffer.lock().await.view()),
            Action::Key => {
                let key = parse_key(rest, "log key <up|down|home|end>")?;
                let mut buffer = self.buffer.lock().await;
                buffer.scroll(key);
                Ok(buffer.view())
            }
            Action::Help => Ok(help_lines(
                NAME,
                &[
                    ("insert <level> <msg...>", "append a line"),
                    ("clear", "drop every line"),
                    ("show", "render the current view"),
                    ("key <up|down|home|end>", "scroll"),
                ],
            )),
            other => Err(PluginError::UnsupportedAction(other.to_string())),
        }
    }

    fn describe(&self) -> &str {
        "in-memory log panel"
    }
}

#[cfg(test)]
#[path = "../tests/log_tests.rs"]
mod tests;
