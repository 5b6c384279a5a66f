use super::*;
use shared::domain::CommandSource;

fn cmd(raw: &str) -> Command {
    Command::parse(CommandSource::Cli, raw).expect("command")
}

#[tokio::test]
async fn single_producer_commands_arrive_in_publish_order() {
    let (bus, mut receiver) = CommandBus::new(16);
    for i in 0..10 {
        bus.publish(cmd(&format!("log insert info {i}"))).expect("publish");
    }

    for i in 0..10 {
        let envelope = receiver.receive().await.expect("envelope");
        assert_eq!(envelope.command.args()[2], i.to_string());
    }
}

#[tokio::test]
async fn ids_are_assigned_in_increasing_order() {
    let (bus, _receiver) = CommandBus::new(4);
    let first = bus.publish(cmd("time show")).expect("publish");
    let second = bus.publish(cmd("time show")).expect("publish");
    assert!(second > first);
}

#[tokio::test]
async fn publish_after_shutdown_fails_with_closed() {
    let (bus, _receiver) = CommandBus::new(4);
    bus.broadcast_shutdown();
    assert!(bus.is_shutdown());
    assert_eq!(bus.publish(cmd("time show")), Err(BusError::Closed));
    assert_eq!(
        bus.request(cmd("time show")).map(|_| ()),
        Err(BusError::Closed)
    );
}

#[tokio::test]
async fn full_queue_reports_busy_instead_of_blocking() {
    let (bus, _receiver) = CommandBus::new(1);
    bus.publish(cmd("time show")).expect("first fits");
    assert_eq!(bus.publish(cmd("time show")), Err(BusError::Busy));
}

#[tokio::test]
async fn buffered_commands_are_drained_after_shutdown() {
    let (bus, mut receiver) = CommandBus::new(8);
    bus.publish(cmd("a one")).expect("publish");
    bus.publish(cmd("b two")).expect("publish");
    bus.broadcast_shutdown();

    assert_eq!(receiver.pending(), 2);
    assert_eq!(receiver.receive().await.expect("first").command.verb(), "a");
    assert_eq!(receiver.receive().await.expect("second").command.verb(), "b");
    assert!(receiver.receive().await.is_none());
}

#[tokio::test]
async fn receive_wakes_up_when_shutdown_fires() {
    let (bus, mut receiver) = CommandBus::new(8);
    let waiter = tokio::spawn(async move { receiver.receive().await.is_none() });

    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.broadcast_shutdown();

    let drained = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("receiver should stop")
        .expect("join");
    assert!(drained);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_shared_between_clones() {
    let signal = ShutdownSignal::new();
    let (bus, receiver) = CommandBus::with_shutdown(4, signal.clone());
    let producer = bus.clone();

    producer.broadcast_shutdown();
    producer.broadcast_shutdown();

    assert!(signal.is_fired());
    assert!(bus.is_shutdown());
    assert!(receiver.is_shutdown());
    signal.fired().await;
}

#[tokio::test]
async fn pending_reply_times_out_when_nobody_answers() {
    let (bus, _receiver) = CommandBus::new(4);
    let pending = bus.request(cmd("time show")).expect("request");
    let outcome = pending.wait(Duration::from_millis(20)).await;
    assert_eq!(outcome, Err(ErrorKind::Timeout));
}

#[tokio::test]
async fn pending_reply_receives_its_own_result() {
    let (bus, mut receiver) = CommandBus::new(4);
    let pending = bus.request(cmd("time show")).expect("request");
    let id = pending.id();

    let envelope = receiver.receive().await.expect("envelope");
    assert_eq!(envelope.id, id);
    envelope
        .reply
        .expect("reply channel")
        .send(DispatchResult::success(envelope.id, "12:00"))
        .expect("send");

    let result = pending.wait(Duration::from_secs(1)).await.expect("result");
    assert_eq!(result.command_id, id);
    assert_eq!(result.output, "12:00");
}
