//! Line-oriented adapter: one command per input line, dirty panels printed
//! as they change.

use std::{io, time::Duration};

use chrono::Local;
use dispatch::{CommandBus, DispatcherState, PanelStore};
use shared::{
    domain::CommandSource,
    error::BusError,
    protocol::{Command, PanelState},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::watch,
};
use tracing::{debug, info, warn};

const RENDER_INTERVAL: Duration = Duration::from_millis(100);

pub async fn run(
    bus: CommandBus,
    panels: PanelStore,
    dispatcher: watch::Receiver<DispatcherState>,
) -> io::Result<()> {
    let renderer = tokio::spawn(render_loop(panels, dispatcher, tokio::io::stdout()));

    let published = read_commands(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), &bus).await;
    // The reader only returns on shutdown or error. The renderer stops once the
    // dispatcher has drained what was queued.
    bus.broadcast_shutdown();

    match renderer.await {
        Ok(Err(err)) => warn!(error = %err, "panel renderer failed"),
        Err(err) => warn!(error = %err, "panel renderer task aborted"),
        Ok(Ok(())) => {}
    }
    let published = published?;
    info!(published, "cli adapter stopped");
    Ok(())
}

/// Publishes every line read from `reader` until shutdown or end of input.
/// End of input broadcasts shutdown since nothing else can feed this adapter.
pub async fn read_commands<R, W>(reader: R, mut out: W, bus: &CommandBus) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let shutdown = bus.shutdown_signal();
    let mut lines = reader.lines();
    let mut published = 0;

    loop {
        write_prompt(&mut out).await?;
        let line = tokio::select! {
            biased;
            _ = shutdown.fired() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("end of input");
            bus.broadcast_shutdown();
            break;
        };

        let Ok(command) = Command::parse(CommandSource::Cli, line) else {
            continue;
        };
        match bus.publish(command) {
            Ok(id) => {
                debug!(command_id = %id, "cli command queued");
                published += 1;
            }
            Err(BusError::Busy) => warn!("command queue full; input dropped"),
            Err(BusError::Closed) => break,
        }
    }

    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(published)
}

async fn write_prompt<W: AsyncWrite + Unpin>(out: &mut W) -> io::Result<()> {
    out.write_all(format!("{} > ", Local::now().format("%H:%M:%S")).as_bytes())
        .await?;
    out.flush().await
}

/// Prints dirty panels until the dispatcher has stopped, so results of
/// commands drained after shutdown are still shown.
pub async fn render_loop<W>(
    panels: PanelStore,
    mut dispatcher: watch::Receiver<DispatcherState>,
    mut out: W,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(RENDER_INTERVAL);
    while *dispatcher.borrow() != DispatcherState::Stopped {
        tokio::select! {
            changed = dispatcher.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                render_dirty(&panels, &mut out).await?;
            }
        }
    }
    render_dirty(&panels, &mut out).await?;
    Ok(())
}

/// Prints every dirty panel and marks it clean. Returns how many were printed.
pub async fn render_dirty<W: AsyncWrite + Unpin>(panels: &PanelStore, out: &mut W) -> io::Result<usize> {
    let dirty = panels.drain_dirty();
    for panel in &dirty {
        out.write_all(format_panel(panel).as_bytes()).await?;
    }
    if !dirty.is_empty() {
        out.flush().await?;
    }
    Ok(dirty.len())
}

fn format_panel(panel: &PanelState) -> String {
    let mut text = format!("\n[{}]\n", panel.plugin_name);
    for line in &panel.rendered_lines {
        text.push_str("  ");
        text.push_str(line);
        text.push('\n');
    }
    text
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
