use std::{any::Any, panic::AssertUnwindSafe};

use futures::FutureExt;
use shared::{
    domain::CommandId,
    error::ErrorKind,
    protocol::{Command, DispatchResult},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    bus::{CommandBus, CommandReceiver, Envelope},
    panels::PanelStore,
    plugins::log,
    registry::{PluginContext, PluginRegistry, RESERVED_VERBS},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: u64,
    pub failed: u64,
}

/// Single consumer of the command bus.
pub struct Dispatcher {
    registry: PluginRegistry,
    panels: PanelStore,
    bus: CommandBus,
    receiver: CommandReceiver,
    state: watch::Sender<DispatcherState>,
}

impl Dispatcher {
    pub fn new(
        registry: PluginRegistry,
        panels: PanelStore,
        bus: CommandBus,
        receiver: CommandReceiver,
    ) -> Self {
        let (state, _) = watch::channel(DispatcherState::Running);
        Self {
            registry,
            panels,
            bus,
            receiver,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// Runs until shutdown has been broadcast and the queue is drained.
    pub async fn run(mut self) -> DispatchReport {
        info!(plugins = self.registry.len(), "dispatcher running");
        let mut report = DispatchReport::default();

        loop {
            if self.receiver.is_shutdown() && *self.state.borrow() == DispatcherState::Running {
                debug!(pending = self.receiver.pending(), "draining command queue");
                self.state.send_replace(DispatcherState::Draining);
            }

            let Some(envelope) = self.receiver.receive().await else {
                break;
            };

            let result = self.handle(&envelope).await;
            report.dispatched += 1;
            if !result.ok {
                report.failed += 1;
                if envelope.reply.is_none() {
                    self.log_failure(&envelope.command, &result).await;
                }
            }
            reply(envelope, result);
        }

        self.state.send_replace(DispatcherState::Stopped);
        info!(
            dispatched = report.dispatched,
            failed = report.failed,
            "dispatcher stopped"
        );
        report
    }

    async fn handle(&self, envelope: &Envelope) -> DispatchResult {
        let command = &envelope.command;
        let id = envelope.id;
        debug!(command_id = %id, source = %command.source(), raw = command.raw(), "dispatching");

        let namespace = command.verb();
        if RESERVED_VERBS.contains(&namespace) {
            info!(command_id = %id, source = %command.source(), "shutdown requested");
            self.bus.broadcast_shutdown();
            return DispatchResult::success(id, "shutting down");
        }

        let Some(plugin) = self.registry.resolve(namespace) else {
            return failure(id, command, ErrorKind::UnknownPlugin, format!("unknown plugin `{namespace}`"));
        };

        let ctx = PluginContext {
            command,
            registry: &self.registry,
            panels: &self.panels,
            bus: &self.bus,
        };
        let outcome = AssertUnwindSafe(plugin.invoke(&ctx, command.args()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(lines)) => {
                let output = lines.join("\n");
                self.panels.update(namespace, lines);
                DispatchResult::success(id, output)
            }
            Ok(Err(err)) => failure(id, command, ErrorKind::HandlerFailed, err.to_string()),
            Err(panic) => failure(
                id,
                command,
                ErrorKind::HandlerFailed,
                format!("handler panicked: {}", panic_message(panic.as_ref())),
            ),
        }
    }

    /// Nobody waits on a published command, so its failure goes to the log
    /// panel where the CLI and GUI show it.
    async fn log_failure(&self, command: &Command, result: &DispatchResult) {
        if command.verb() == log::NAME {
            return;
        }
        let Some(plugin) = self.registry.resolve(log::NAME) else {
            return;
        };

        let kind = result.error_kind.unwrap_or(ErrorKind::HandlerFailed);
        let entry = format!("`{}` {kind}: {}", command.raw(), result.output);
        let args: Vec<String> = ["insert", "warn"]
            .into_iter()
            .map(str::to_string)
            .chain(entry.split_whitespace().map(str::to_string))
            .collect();
        let ctx = PluginContext {
            command,
            registry: &self.registry,
            panels: &self.panels,
            bus: &self.bus,
        };

        match AssertUnwindSafe(plugin.invoke(&ctx, &args)).catch_unwind().await {
            Ok(Ok(lines)) => {
                self.panels.update(log::NAME, lines);
            }
            Ok(Err(err)) => debug!(error = %err, "failure not recorded in the log panel"),
            Err(_) => debug!("log panel panicked while recording a failure"),
        }
    }
}

fn failure(id: CommandId, command: &Command, kind: ErrorKind, message: String) -> DispatchResult {
    warn!(
        command_id = %id,
        source = %command.source(),
        raw = command.raw(),
        error = %kind,
        "{message}"
    );
    DispatchResult::failure(id, kind, message)
}

fn reply(envelope: Envelope, result: DispatchResult) {
    if let Some(reply) = envelope.reply {
        if reply.send(result).is_err() {
            debug!(command_id = %envelope.id, "requester gave up before the result was ready");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
