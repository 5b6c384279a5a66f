use std::{
    fs::OpenOptions,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use dispatch::{
    plugins::{register_builtins, SystemInfo},
    CommandBus, Dispatcher, PanelStore, PluginRegistry,
};
use server::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod gui;
mod script;

use config::{load_settings, Mode, Settings};

/// Blocking stdin reads are abandoned after this long at exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "cng4", version, about = "Command bus with plugin panels, driven from a terminal or HTTP")]
struct Arguments {
    /// Interactive front end.
    #[arg(short, long, value_enum, default_value_t = Mode::Gui)]
    mode: Mode,
    /// Settings file with the startup scripts.
    #[arg(short, long, default_value = "cfg.toml")]
    script: PathBuf,
}

fn main() -> Result<()> {
    let args = Arguments::parse();
    let loaded = load_settings(&args.script)?;
    init_logging(args.mode, &loaded.settings)?;
    if !loaded.from_file {
        warn!(path = %args.script.display(), "settings file not found; using defaults");
    }

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let result = runtime.block_on(run(args.mode, loaded.settings));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

fn init_logging(mode: Mode, settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .with_context(|| format!("invalid log filter `{}`", settings.log_filter))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match mode {
        Mode::Cli => builder.with_writer(std::io::stderr).init(),
        Mode::Gui => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&settings.log_file)
                .with_context(|| format!("opening log file {}", settings.log_file))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
    }
    Ok(())
}

fn build_registry(mode: Mode, settings: &Settings) -> Result<PluginRegistry> {
    let mut builder = PluginRegistry::builder();
    register_builtins(
        &mut builder,
        SystemInfo {
            name: settings.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: mode.as_str().to_string(),
        },
    )
    .context("registering built-in plugins")?;
    Ok(builder.build())
}

async fn run(mode: Mode, settings: Settings) -> Result<()> {
    info!(name = %settings.name, mode = mode.as_str(), "starting");

    let registry = build_registry(mode, &settings)?;
    let panels = PanelStore::for_registry(&registry);
    let (bus, receiver) = CommandBus::new(settings.queue_capacity);

    let listener = if settings.web_enabled {
        let listener = tokio::net::TcpListener::bind(&settings.web_bind)
            .await
            .with_context(|| format!("binding web adapter to {}", settings.web_bind))?;
        Some(listener)
    } else {
        None
    };

    let dispatcher = Dispatcher::new(registry, panels.clone(), bus.clone(), receiver);
    let dispatcher_state = dispatcher.state();
    let dispatcher = tokio::spawn(dispatcher.run());

    let web = listener.map(|listener| {
        let state = AppState::new(
            settings.name.clone(),
            bus.clone(),
            panels.clone(),
            settings.reply_timeout(),
        );
        tokio::spawn(server::serve(listener, Arc::new(state)))
    });

    let signals = tokio::spawn(shutdown_on_ctrl_c(bus.clone()));

    script::run(&bus, settings.script_for(mode));

    let adapter = match mode {
        Mode::Cli => cli::run(bus.clone(), panels.clone(), dispatcher_state).await,
        Mode::Gui => gui::run(bus.clone(), panels.clone(), settings.name.clone()).await,
    };
    // Whatever ended the adapter, everything else winds down with it.
    bus.broadcast_shutdown();
    if let Err(err) = &adapter {
        warn!(error = %err, mode = mode.as_str(), "interactive adapter failed");
    }

    let report = dispatcher.await.context("dispatcher task panicked")?;
    if let Some(web) = web {
        web.await
            .context("web adapter task panicked")?
            .context("web adapter failed")?;
    }
    signals.abort();

    info!(
        dispatched = report.dispatched,
        failed = report.failed,
        "stopped"
    );
    adapter.with_context(|| format!("{} adapter", mode.as_str()))
}

async fn shutdown_on_ctrl_c(bus: CommandBus) {
    let shutdown = bus.shutdown_signal();
    tokio::select! {
        _ = shutdown.fired() => {}
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                info!("ctrl-c received");
                bus.broadcast_shutdown();
            }
            Err(err) => warn!(error = %err, "could not listen for ctrl-c"),
        },
    }
}
