use crate::error::ChannelError;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Stable opaque handle for a connected receiver. Minted by an
/// `AtomicU64` counter at Client construction (see `client.rs`) rather
/// than derived from the connection object, so identity never depends
/// on structural equality of the underlying socket.
pub type ReceiverId = u64;

/// Anything with an inbox to which encoded messages are delivered.
#[derive(Clone)]
pub struct Receiver {
    pub id: ReceiverId,
    pub inbox: mpsc::Sender<Bytes>,
}

/// Set-like membership of active receivers. Only the Channel event loop
/// calls the mutators (`register`/`unregister`); `list` is only called
/// by the broadcaster while no mutator is in flight — guaranteed by the
/// single-writer loop owning both.
pub trait Registrar: Send {
    fn register(&mut self, receiver: Receiver) -> Result<(), ChannelError>;
    fn unregister(&mut self, id: ReceiverId) -> Result<(), ChannelError>;
    fn check(&self, id: ReceiverId) -> bool;
    fn list(&self) -> Vec<Receiver>;
}

#[derive(Default)]
pub struct InMemoryRegistrar {
    receivers: HashMap<ReceiverId, Receiver>,
}

impl Registrar for InMemoryRegistrar {
    fn register(&mut self, receiver: Receiver) -> Result<(), ChannelError> {
        if self.receivers.contains_key(&receiver.id) {
            return Err(ChannelError::AlreadyPresent);
        }
        self.receivers.insert(receiver.id, receiver);
        Ok(())
    }

    fn unregister(&mut self, id: ReceiverId) -> Result<(), ChannelError> {
        if self.receivers.remove(&id).is_none() {
            return Err(ChannelError::NotPresent);
        }
        Ok(())
    }

    fn check(&self, id: ReceiverId) -> bool {
        self.receivers.contains_key(&id)
    }

    fn list(&self) -> Vec<Receiver> {
        self.receivers.values().cloned().collect()
    }
}
