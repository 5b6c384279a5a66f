use dispatch::CommandBus;
use shared::{domain::CommandSource, error::BusError, protocol::Command};
use tracing::{debug, info, warn};

/// Publishes each command line of a startup script, in order, with source
/// `Script`. Blank and comment-only lines are skipped. Returns how many
/// commands were queued.
pub fn run(bus: &CommandBus, script: &str) -> usize {
    let mut queued = 0;
    for (index, line) in script.lines().enumerate() {
        let Ok(command) = Command::parse(CommandSource::Script, line.trim()) else {
            continue;
        };
        match bus.publish(command) {
            Ok(id) => {
                debug!(command_id = %id, line = index + 1, "script command queued");
                queued += 1;
            }
            Err(BusError::Busy) => {
                warn!(line = index + 1, raw = line.trim(), "command queue full; script line dropped");
            }
            Err(BusError::Closed) => {
                warn!(line = index + 1, "shutdown during startup script; remaining lines skipped");
                break;
            }
        }
    }
    if queued > 0 {
        info!(queued, "startup script queued");
    }
    queued
}

#[cfg(test)]
#[path = "tests/script_tests.rs"]
mod tests;
