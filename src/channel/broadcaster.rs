use crate::channel::evictor::Evictor;
use crate::channel::registrar::{Receiver, ReceiverId};
use crate::message::Message;
use bytes::Bytes;
use tracing::error;

/// Encodes a `Message` to its wire form once per broadcast.
pub trait Broadcaster: Send {
    fn encode(&self, msg: &Message) -> Option<Bytes>;
}

/// JSON-object encoding, matching the `{ "user": ..., "content": ... }`
/// wire shape. Returns `None` on encoding failure so the caller can
/// drop the message entirely rather than partially fan it out.
#[derive(Default)]
pub struct DefaultBroadcaster;

impl Broadcaster for DefaultBroadcaster {
    fn encode(&self, msg: &Message) -> Option<Bytes> {
        match serde_json::to_vec(msg) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(err) => {
                error!(error = %err, "failed to encode message, dropping");
                None
            }
        }
    }
}

/// Attempts a non-blocking send of `encoded` to every receiver in
/// `receivers`. A full inbox or a closed receiver is fed to `evictor`;
/// receivers the evictor now wants evicted are returned so the caller
/// (the single-writer Channel loop) can unregister them.
pub fn fan_out(receivers: &[Receiver], encoded: &Bytes, evictor: &mut dyn Evictor) -> Vec<ReceiverId> {
    let mut to_unregister = Vec::new();
    for receiver in receivers {
        if receiver.inbox.try_send(encoded.clone()).is_err() && evictor.evict(receiver.id) {
            to_unregister.push(receiver.id);
        }
    }
    to_unregister
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::evictor::InMemoryEvictor;
    use crate::message::User;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn encode_produces_the_documented_wire_shape() {
        let broadcaster = DefaultBroadcaster;
        let msg = Message {
            sender: User::new("dpop"),
            content: "Hello!".to_owned(),
        };
        let encoded = broadcaster.encode(&msg).expect("encode should succeed");
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "user": { "Name": "dpop" }, "content": "Hello!" })
        );
    }

    #[tokio::test]
    async fn fan_out_delivers_to_every_receiver_with_room() {
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let receivers = vec![
            Receiver { id: 1, inbox: tx1 },
            Receiver { id: 2, inbox: tx2 },
        ];
        let mut evictor = InMemoryEvictor::new(10, Duration::from_secs(10));
        let encoded = Bytes::from_static(b"{}");

        let evicted = fan_out(&receivers, &encoded, &mut evictor);

        assert!(evicted.is_empty());
        assert_eq!(rx1.recv().await.unwrap(), encoded);
        assert_eq!(rx2.recv().await.unwrap(), encoded);
    }

    #[tokio::test]
    async fn fan_out_does_not_block_on_a_full_inbox_and_evicts_at_threshold() {
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(Bytes::from_static(b"occupying slot")).unwrap();
        let receivers = vec![Receiver { id: 1, inbox: tx }];
        let mut evictor = InMemoryEvictor::new(0, Duration::from_secs(10));

        let evicted = fan_out(&receivers, &Bytes::from_static(b"{}"), &mut evictor);

        assert_eq!(evicted, vec![1]);
    }
}
