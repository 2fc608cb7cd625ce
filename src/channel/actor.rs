use crate::channel::broadcaster::{fan_out, Broadcaster, DefaultBroadcaster};
use crate::channel::evictor::{Evictor, InMemoryEvictor};
use crate::channel::registrar::{InMemoryRegistrar, Receiver, ReceiverId, Registrar};
use crate::config::Config;
use crate::message::Message;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a running Channel. Cloning shares the same underlying
/// event loop — every clone's `register`/`unregister`/`broadcast` calls
/// are serialized into the same total order by the loop's inboxes.
///
/// Sending on these inboxes after `stop()` has been called is a
/// programmer error: nothing drains them once the loop has exited, so
/// the send may block forever. Callers must not use a stopped channel.
#[derive(Clone)]
pub struct ChannelHandle {
    register_tx: mpsc::Sender<Receiver>,
    unregister_tx: mpsc::Sender<ReceiverId>,
    broadcast_tx: mpsc::Sender<Message>,
    stop: CancellationToken,
}

impl ChannelHandle {
    pub async fn register(&self, receiver: Receiver) {
        let _ = self.register_tx.send(receiver).await;
    }

    pub async fn unregister(&self, id: ReceiverId) {
        let _ = self.unregister_tx.send(id).await;
    }

    pub async fn broadcast(&self, msg: Message) {
        let _ = self.broadcast_tx.send(msg).await;
    }

    /// Idempotent: cancelling an already-stopped channel is a no-op.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

/// Spawns the Channel's single-writer event loop and returns a handle
/// to it. The loop selects over four inboxes (register, unregister,
/// broadcast, stop) plus the evictor's sweep ticker, serving one event
/// at a time so the registrar is mutated by exactly one code path.
pub fn spawn_channel(config: &Config) -> ChannelHandle {
    let (register_tx, register_rx) = mpsc::channel(64);
    let (unregister_tx, unregister_rx) = mpsc::channel(64);
    let (broadcast_tx, broadcast_rx) = mpsc::channel(256);
    let stop = CancellationToken::new();

    let registrar = InMemoryRegistrar::default();
    let evictor = InMemoryEvictor::new(config.eviction_threshold, config.eviction_retention);
    let broadcaster = DefaultBroadcaster;

    tokio::spawn(run(
        registrar,
        evictor,
        broadcaster,
        register_rx,
        unregister_rx,
        broadcast_rx,
        stop.clone(),
        config.eviction_retention,
    ));

    ChannelHandle {
        register_tx,
        unregister_tx,
        broadcast_tx,
        stop,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    mut registrar: impl Registrar,
    mut evictor: impl Evictor,
    broadcaster: impl Broadcaster,
    mut register_rx: mpsc::Receiver<Receiver>,
    mut unregister_rx: mpsc::Receiver<ReceiverId>,
    mut broadcast_rx: mpsc::Receiver<Message>,
    stop: CancellationToken,
    sweep_period: std::time::Duration,
) {
    let mut sweep = tokio::time::interval(sweep_period);
    sweep.tick().await; // first tick fires immediately; nothing to sweep yet

    loop {
        tokio::select! {
            biased;

            () = stop.cancelled() => {
                debug!("channel received stop signal");
                return;
            }

            Some(receiver) = register_rx.recv() => {
                let id = receiver.id;
                match registrar.register(receiver) {
                    Ok(()) => debug!(receiver_id = id, "receiver registered"),
                    Err(err) => warn!(receiver_id = id, %err, "register failed"),
                }
            }

            Some(id) = unregister_rx.recv() => {
                match registrar.unregister(id) {
                    Ok(()) => debug!(receiver_id = id, "receiver unregistered"),
                    Err(err) => warn!(receiver_id = id, %err, "unregister failed"),
                }
            }

            Some(msg) = broadcast_rx.recv() => {
                if msg.content.is_empty() {
                    debug!("empty message dropped, never broadcast");
                    continue;
                }
                let Some(encoded) = broadcaster.encode(&msg) else {
                    continue;
                };
                let receivers = registrar.list();
                for id in fan_out(&receivers, &encoded, &mut evictor) {
                    let _ = registrar.unregister(id);
                }
            }

            _ = sweep.tick() => {
                evictor.sweep(Instant::now());
            }
        }
    }
}
