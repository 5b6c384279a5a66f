use std::time::Duration;

use shared::{domain::CommandSource, error::PluginError};

use super::*;
use crate::{
    plugins::{register_builtins, SystemInfo},
    registry::plugin_fn,
};

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    bus: CommandBus,
    panels: PanelStore,
    state: watch::Receiver<DispatcherState>,
    task: tokio::task::JoinHandle<DispatchReport>,
}

fn registry() -> PluginRegistry {
    let mut builder = PluginRegistry::builder();
    register_builtins(
        &mut builder,
        SystemInfo {
            name: "test".into(),
            version: "0.0.0".into(),
            mode: "cli".into(),
        },
    )
    .expect("builtins");
    builder
        .register("echo", plugin_fn(|args| Ok(vec![args.join(" ")])))
        .expect("echo");
    builder
        .register(
            "fail",
            plugin_fn(|_| Err(PluginError::Failed("boom".to_string()))),
        )
        .expect("fail");
    builder
        .register("panic", plugin_fn(|_| panic!("handler exploded")))
        .expect("panic");
    builder.build()
}

fn start() -> Harness {
    let registry = registry();
    let panels = PanelStore::for_registry(&registry);
    let (bus, receiver) = CommandBus::new(64);
    let dispatcher = Dispatcher::new(registry, panels.clone(), bus.clone(), receiver);
    let state = dispatcher.state();
    let task = tokio::spawn(dispatcher.run());
    Harness {
        bus,
        panels,
        state,
        task,
    }
}

fn cmd(raw: &str) -> Command {
    Command::parse(CommandSource::Web, raw).expect("command")
}

async fn ask(bus: &CommandBus, raw: &str) -> DispatchResult {
    bus.request(cmd(raw))
        .expect("request")
        .wait(WAIT)
        .await
        .expect("reply")
}

#[tokio::test]
async fn manager_lists_registered_plugins() {
    let harness = start();
    let result = ask(&harness.bus, "p plugins show").await;
    assert!(result.ok, "{result:?}");
    for name in ["p", "log", "system", "time", "echo"] {
        assert!(result.output.contains(name), "missing {name} in {}", result.output);
    }
}

#[tokio::test]
async fn unknown_namespace_yields_unknown_plugin() {
    let harness = start();
    let result = ask(&harness.bus, "zzz unknown").await;
    assert!(!result.ok);
    assert_eq!(result.error_kind, Some(ErrorKind::UnknownPlugin));
}

#[tokio::test]
async fn failing_handler_does_not_stop_the_next_command() {
    let harness = start();

    let failed = ask(&harness.bus, "fail now").await;
    assert_eq!(failed.error_kind, Some(ErrorKind::HandlerFailed));
    assert!(failed.output.contains("boom"));

    let next = ask(&harness.bus, "echo still alive").await;
    assert!(next.ok);
    assert_eq!(next.output, "still alive");
}

#[tokio::test]
async fn panicking_handler_is_isolated() {
    let harness = start();

    let result = ask(&harness.bus, "panic please").await;
    assert_eq!(result.error_kind, Some(ErrorKind::HandlerFailed));
    assert!(result.output.contains("handler exploded"));

    assert!(ask(&harness.bus, "time show").await.ok);
}

#[tokio::test]
async fn reply_carries_the_matching_command_id() {
    let harness = start();
    let first = harness.bus.request(cmd("echo one")).expect("request");
    let second = harness.bus.request(cmd("echo two")).expect("request");
    let (first_id, second_id) = (first.id(), second.id());

    let second = second.wait(WAIT).await.expect("reply");
    let first = first.wait(WAIT).await.expect("reply");
    assert_eq!((first.command_id, first.output.as_str()), (first_id, "one"));
    assert_eq!((second.command_id, second.output.as_str()), (second_id, "two"));
}

#[tokio::test]
async fn successful_invocation_updates_the_panel() {
    let harness = start();
    ask(&harness.bus, "echo hello panel").await;

    let panel = harness.panels.get("echo").expect("panel");
    assert_eq!(panel.rendered_lines, ["hello panel"]);
    assert!(panel.dirty);

    ask(&harness.bus, "fail again").await;
    let untouched = harness.panels.get("fail").expect("panel");
    assert!(untouched.rendered_lines.is_empty());
    assert!(!untouched.dirty);
}

#[tokio::test]
async fn commands_queued_before_shutdown_are_dispatched_before_stop() {
    let registry = registry();
    let panels = PanelStore::for_registry(&registry);
    let (bus, receiver) = CommandBus::new(64);

    let mut pending = Vec::new();
    for i in 0..5 {
        pending.push(bus.request(cmd(&format!("echo {i}"))).expect("request"));
    }
    bus.broadcast_shutdown();
    assert_eq!(bus.publish(cmd("echo late")), Err(shared::error::BusError::Closed));

    let dispatcher = Dispatcher::new(registry, panels.clone(), bus.clone(), receiver);
    let state = dispatcher.state();
    let report = tokio::time::timeout(WAIT, dispatcher.run())
        .await
        .expect("dispatcher should stop");

    assert_eq!(report.dispatched, 5);
    assert_eq!(*state.borrow(), DispatcherState::Stopped);
    for (i, reply) in pending.into_iter().enumerate() {
        let result = reply.wait(WAIT).await.expect("reply");
        assert_eq!(result.output, i.to_string());
    }
    assert_eq!(panels.get("echo").expect("panel").rendered_lines, ["4"]);
}

#[tokio::test]
async fn quit_verb_broadcasts_shutdown_and_stops() {
    let mut harness = start();
    let result = ask(&harness.bus, "quit").await;
    assert!(result.ok);
    assert!(harness.bus.is_shutdown());

    let report = tokio::time::timeout(WAIT, &mut harness.task)
        .await
        .expect("dispatcher should stop")
        .expect("join");
    assert_eq!(report.dispatched, 1);
    assert_eq!(*harness.state.borrow(), DispatcherState::Stopped);
}

#[tokio::test]
async fn fire_and_forget_commands_are_dispatched_in_order() {
    let harness = start();
    for i in 0..20 {
        harness
            .bus
            .publish(Command::parse(CommandSource::Cli, format!("log insert info line-{i}")).expect("cmd"))
            .expect("publish");
    }
    let shown = ask(&harness.bus, "log show").await;
    let lines: Vec<&str> = shown.output.lines().collect();
    assert_eq!(lines.len(), 20);
    for (i, line) in lines.iter().enumerate() {
        assert!(line.ends_with(&format!("line-{i}")), "out of order: {line}");
    }
}

#[tokio::test]
async fn tab_cycles_focus_and_keys_are_forwarded() {
    let harness = start();

    let focused = ask(&harness.bus, "p panels focus log").await;
    assert_eq!(focused.output, "focus: log");

    for i in 0..60 {
        harness
            .bus
            .publish(cmd(&format!("log insert info {i}")))
            .expect("publish");
    }
    let forwarded = ask(&harness.bus, "p panels key home").await;
    assert_eq!(forwarded.output, "forwarded `home` to log");

    // The forwarded `log key home` was queued behind the reply above.
    let shown = ask(&harness.bus, "log show").await;
    assert!(shown.output.lines().next().expect("line").ends_with(" 0"));

    let tabbed = ask(&harness.bus, "p panels key tab").await;
    assert!(tabbed.output.starts_with("focus: "));
    assert_ne!(tabbed.output, "focus: log");
}

#[tokio::test]
async fn unsupported_action_is_a_handler_failure() {
    let harness = start();
    let result = ask(&harness.bus, "time dance").await;
    assert_eq!(result.error_kind, Some(ErrorKind::HandlerFailed));
    assert!(result.output.contains("dance"));
}

#[tokio::test]
async fn failed_published_commands_are_recorded_in_the_log_panel() {
    let harness = start();
    for raw in ["zzz unknown", "time dance"] {
        harness
            .bus
            .publish(Command::parse(CommandSource::Cli, raw).expect("cmd"))
            .expect("publish");
    }
    // Requesters get the failure in their reply; it stays out of the log.
    ask(&harness.bus, "fail loudly").await;

    let log = harness.panels.get(log::NAME).expect("log panel");
    assert!(log.dirty);
    assert_eq!(log.rendered_lines.len(), 2, "{:?}", log.rendered_lines);
    let (unknown, unsupported) = (&log.rendered_lines[0], &log.rendered_lines[1]);
    assert!(unknown.contains("cli: [WARN] `zzz unknown` UnknownPlugin"), "{unknown}");
    assert!(unsupported.contains("HandlerFailed"), "{unsupported}");
    assert!(unsupported.contains("dance"), "{unsupported}");
}

#[tokio::test]
async fn failed_log_commands_are_not_logged_again() {
    let harness = start();
    harness
        .bus
        .publish(Command::parse(CommandSource::Cli, "log insert loud hello").expect("cmd"))
        .expect("publish");
    let shown = ask(&harness.bus, "log show").await;
    assert!(shown.ok);
    assert!(shown.output.is_empty(), "{}", shown.output);
}

struct SlowEcho;

#[async_trait::async_trait]
impl crate::registry::Plugin for SlowEcho {
    async fn invoke(
        &self,
        _ctx: &PluginContext<'_>,
        args: &[String],
    ) -> Result<Vec<String>, PluginError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(args.to_vec())
    }
}

#[tokio::test]
async fn shutdown_moves_through_draining_before_stopped() {
    let mut builder = PluginRegistry::builder();
    builder.register("slow", SlowEcho).expect("register");
    let registry = builder.build();
    let panels = PanelStore::for_registry(&registry);
    let (bus, receiver) = CommandBus::new(8);

    let dispatcher = Dispatcher::new(registry, panels.clone(), bus.clone(), receiver);
    let mut state = dispatcher.state();
    for i in 0..3 {
        bus.publish(cmd(&format!("slow {i}"))).expect("publish");
    }
    let task = tokio::spawn(dispatcher.run());

    // Let the first command get stuck in the handler.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*state.borrow(), DispatcherState::Running);
    bus.broadcast_shutdown();

    let next = *tokio::time::timeout(WAIT, state.wait_for(|s| *s != DispatcherState::Running))
        .await
        .expect("state should change")
        .expect("dispatcher alive");
    assert_eq!(next, DispatcherState::Draining);

    let report = tokio::time::timeout(WAIT, task)
        .await
        .expect("dispatcher should stop")
        .expect("join");
    assert_eq!(report.dispatched, 3);
    assert_eq!(*state.borrow(), DispatcherState::Stopped);
    assert_eq!(panels.get("slow").expect("panel").rendered_lines, ["2"]);
}

#[tokio::test]
async fn log_lines_are_stamped_when_the_command_arrived() {
    let harness = start();
    let command = Command::parse(CommandSource::Cli, "log insert info stamped").expect("cmd");
    let stamp = command
        .received_at()
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S")
        .to_string();
    // Dispatched well after it was parsed.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    harness.bus.publish(command).expect("publish");

    let shown = ask(&harness.bus, "log show").await;
    assert!(shown.output.starts_with(&format!("{stamp}    cli: [INFO] stamped")), "{}", shown.output);
}
