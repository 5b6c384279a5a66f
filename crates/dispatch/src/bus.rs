use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::CommandId,
    error::{BusError, ErrorKind},
    protocol::{Command, DispatchResult},
};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Process-wide shutdown latch. Firing is idempotent and permanent.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.token.cancel();
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`fire`](Self::fire) has been called, immediately if it already was.
    pub async fn fired(&self) {
        self.token.cancelled().await;
    }
}

/// A command in flight, tagged with its id and, for synchronous callers,
/// the channel its result must be sent back on.
#[derive(Debug)]
pub struct Envelope {
    pub id: CommandId,
    pub command: Command,
    pub reply: Option<oneshot::Sender<DispatchResult>>,
}

/// Producer half of the bus. Cheap to clone; one clone per ingress adapter.
#[derive(Debug, Clone)]
pub struct CommandBus {
    tx: mpsc::Sender<Envelope>,
    shutdown: ShutdownSignal,
    next_id: Arc<AtomicU64>,
}

/// Consumer half of the bus. There is exactly one, owned by the dispatcher.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<Envelope>,
    shutdown: ShutdownSignal,
    closed: bool,
}

impl CommandBus {
    pub fn new(capacity: usize) -> (Self, CommandReceiver) {
        Self::with_shutdown(capacity, ShutdownSignal::new())
    }

    pub fn with_shutdown(capacity: usize, shutdown: ShutdownSignal) -> (Self, CommandReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let bus = Self {
            tx,
            shutdown: shutdown.clone(),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let receiver = CommandReceiver {
            rx,
            shutdown,
            closed: false,
        };
        (bus, receiver)
    }

    /// Enqueues a command without waiting for its result.
    pub fn publish(&self, command: Command) -> Result<CommandId, BusError> {
        self.enqueue(command, None)
    }

    /// Enqueues a command and hands back the receiving end of its result.
    pub fn request(&self, command: Command) -> Result<PendingReply, BusError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let id = self.enqueue(command, Some(reply_tx))?;
        Ok(PendingReply { id, rx: reply_rx })
    }

    fn enqueue(
        &self,
        command: Command,
        reply: Option<oneshot::Sender<DispatchResult>>,
    ) -> Result<CommandId, BusError> {
        if self.shutdown.is_fired() {
            return Err(BusError::Closed);
        }

        let id = CommandId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let envelope = Envelope { id, command, reply };
        match self.tx.try_send(envelope) {
            Ok(()) => Ok(id),
            Err(TrySendError::Full(_)) => Err(BusError::Busy),
            Err(TrySendError::Closed(_)) => Err(BusError::Closed),
        }
    }

    pub fn broadcast_shutdown(&self) {
        self.shutdown.fire();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_fired()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }
}

impl CommandReceiver {
    /// Next command in arrival order.
    ///
    /// Once shutdown has fired the queue is closed to new sends and the
    /// remaining buffered commands are still handed out; `None` means the
    /// queue is closed and empty.
    pub async fn receive(&mut self) -> Option<Envelope> {
        if !self.closed {
            tokio::select! {
                biased;
                envelope = self.rx.recv() => return envelope,
                _ = self.shutdown.fired() => {
                    self.rx.close();
                    self.closed = true;
                }
            }
        }
        self.rx.recv().await
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_fired()
    }

    /// Number of commands buffered and not yet received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Result handle for a command published with [`CommandBus::request`].
#[derive(Debug)]
pub struct PendingReply {
    id: CommandId,
    rx: oneshot::Receiver<DispatchResult>,
}

impl PendingReply {
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Waits for this command's result. Dropping the handle on timeout
    /// lets the dispatcher's late reply fall on the floor.
    pub async fn wait(self, timeout: Duration) -> Result<DispatchResult, ErrorKind> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(ErrorKind::BusClosed),
            Err(_) => Err(ErrorKind::Timeout),
        }
    }
}

#[cfg(test)]
#[path = "tests/bus_tests.rs"]
mod tests;
