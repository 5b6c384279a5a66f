use std::time::Duration;

use dispatch::{plugin_fn, Dispatcher, PluginRegistry};

use super::*;

#[tokio::test]
async fn each_line_becomes_a_cli_command() {
    let (bus, mut receiver) = CommandBus::new(8);
    let input: &[u8] = b"time show\n\n   # just a comment\nlog insert info hi\n";
    let mut out = Vec::new();

    let published = read_commands(input, &mut out, &bus).await.expect("read");
    assert_eq!(published, 2);

    let first = receiver.receive().await.expect("first");
    assert_eq!(first.command.source(), CommandSource::Cli);
    assert_eq!(first.command.raw(), "time show");
    let second = receiver.receive().await.expect("second");
    assert_eq!(second.command.verb(), "log");

    let printed = String::from_utf8(out).expect("utf8");
    assert_eq!(printed.matches(" > ").count(), 5, "{printed}");
}

#[tokio::test]
async fn end_of_input_broadcasts_shutdown() {
    let (bus, _receiver) = CommandBus::new(8);
    let input: &[u8] = b"";
    read_commands(input, Vec::new(), &bus).await.expect("read");
    assert!(bus.is_shutdown());
}

#[tokio::test]
async fn reader_returns_when_shutdown_fires() {
    let (bus, _receiver) = CommandBus::new(8);
    // A reader that never yields a line.
    let (_writer, pipe) = tokio::io::duplex(64);
    let reader = BufReader::new(pipe);

    let task = {
        let bus = bus.clone();
        tokio::spawn(async move { read_commands(reader, Vec::new(), &bus).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.broadcast_shutdown();

    let published = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("reader should stop")
        .expect("join")
        .expect("read");
    assert_eq!(published, 0);
}

#[tokio::test]
async fn dirty_panels_are_printed_once() {
    let mut builder = PluginRegistry::builder();
    builder
        .register("echo", plugin_fn(|args| Ok(vec![args.join(" ")])))
        .expect("register");
    let registry = builder.build();
    let panels = PanelStore::for_registry(&registry);
    let (bus, receiver) = CommandBus::new(8);
    tokio::spawn(Dispatcher::new(registry, panels.clone(), bus.clone(), receiver).run());

    bus.request(Command::parse(CommandSource::Cli, "echo hello there").expect("cmd"))
        .expect("request")
        .wait(Duration::from_secs(2))
        .await
        .expect("reply");

    let mut out = Vec::new();
    assert_eq!(render_dirty(&panels, &mut out).await.expect("render"), 1);
    assert_eq!(String::from_utf8(out).expect("utf8"), "\n[echo]\n  hello there\n");

    let mut again = Vec::new();
    assert_eq!(render_dirty(&panels, &mut again).await.expect("render"), 0);
    assert!(again.is_empty());
}

#[tokio::test]
async fn piped_results_are_printed_after_end_of_input() {
    let mut builder = PluginRegistry::builder();
    builder
        .register(
            "echo",
            plugin_fn(|args| {
                std::thread::sleep(Duration::from_millis(20));
                Ok(vec![args.join(" ")])
            }),
        )
        .expect("register");
    let registry = builder.build();
    let panels = PanelStore::for_registry(&registry);
    let (bus, receiver) = CommandBus::new(8);
    let dispatcher = Dispatcher::new(registry, panels.clone(), bus.clone(), receiver);
    let state = dispatcher.state();
    let dispatcher = tokio::spawn(dispatcher.run());

    let input: &[u8] = b"echo first\necho piped\n";
    assert_eq!(read_commands(input, Vec::new(), &bus).await.expect("read"), 2);
    assert!(bus.is_shutdown());

    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), render_loop(panels.clone(), state, &mut out))
        .await
        .expect("renderer should stop with the dispatcher")
        .expect("render");

    let printed = String::from_utf8(out).expect("utf8");
    assert!(printed.ends_with("\n[echo]\n  piped\n"), "{printed:?}");
    assert!(panels.drain_dirty().is_empty());
    let report = dispatcher.await.expect("join");
    assert_eq!(report.dispatched, 2);
}
