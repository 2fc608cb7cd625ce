use crate::channel::{ChannelHandle, Receiver, ReceiverId};
use crate::config::Config;
use crate::message::{Message, User};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

static NEXT_RECEIVER_ID: AtomicU64 = AtomicU64::new(1);

fn next_receiver_id() -> ReceiverId {
    NEXT_RECEIVER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Per-connection actor: registers with the Channel, then runs a reader
/// pump (connection -> channel) and a writer pump (channel ->
/// connection) concurrently. `start` returns as soon as both pumps are
/// spawned — it does not wait for the connection to close.
pub struct Client;

impl Client {
    pub async fn start(socket: WebSocket, user: User, channel: ChannelHandle, config: Arc<Config>) {
        let id = next_receiver_id();
        let (inbox_tx, inbox_rx) = mpsc::channel::<Bytes>(config.client_inbox_capacity);
        channel.register(Receiver { id, inbox: inbox_tx }).await;

        let (sink, stream) = socket.split();
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(writer_pump(sink, inbox_rx, stop_rx, config.clone()));
        tokio::spawn(reader_pump(stream, user, channel, id, config, stop_tx));
    }
}

/// Writer pump: drains the inbox and writes each payload as a single
/// text frame. Maintains the ping ticker; on any write failure (message
/// or ping) it closes the connection and terminates.
///
/// Generic over the sink so a fake can stand in for a live `WebSocket`
/// in tests — mirrors the trait-per-concern testability the rest of
/// this crate uses for the Channel's registrar/evictor/broadcaster.
async fn writer_pump<S>(
    mut sink: S,
    mut inbox: mpsc::Receiver<Bytes>,
    mut stop_rx: oneshot::Receiver<()>,
    config: Arc<Config>,
) where
    S: Sink<WsMessage> + Unpin,
{
    let mut ping_ticker = tokio::time::interval(config.ping_period);
    ping_ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                debug!("writer pump received stop signal");
                break;
            }

            payload = inbox.recv() => {
                let Some(payload) = payload else {
                    debug!("inbox closed, stopping writer pump");
                    break;
                };
                let Ok(text) = std::str::from_utf8(&payload) else {
                    warn!("dropping non-utf8 payload");
                    continue;
                };
                let write = tokio::time::timeout(
                    config.write_wait,
                    sink.send(WsMessage::Text(text.to_owned().into())),
                )
                .await;
                if !matches!(write, Ok(Ok(()))) {
                    warn!("write to connection failed, closing");
                    break;
                }
            }

            _ = ping_ticker.tick() => {
                let ping = tokio::time::timeout(
                    config.write_wait,
                    sink.send(WsMessage::Ping(Bytes::new())),
                )
                .await;
                if !matches!(ping, Ok(Ok(()))) {
                    warn!("ping failed, closing connection");
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}

/// Reader pump: reads frames with a `pongWait` read deadline (reissued
/// fresh every iteration, so any received frame — in particular a pong
/// — extends it). Decodes one `Message` per text frame, rejects empty
/// content, stamps the authenticated sender, and forwards to the
/// channel's broadcast inbox. On any terminal condition it signals the
/// writer pump to stop and sends exactly one unregister.
///
/// Generic over the stream for the same reason `writer_pump` is generic
/// over the sink: it lets tests drive the pong-deadline path with a
/// stream that never yields, instead of a live connection.
async fn reader_pump<St>(
    mut stream: St,
    user: User,
    channel: ChannelHandle,
    id: ReceiverId,
    config: Arc<Config>,
    stop_tx: oneshot::Sender<()>,
) where
    St: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    loop {
        let next = tokio::time::timeout(config.pong_wait, stream.next()).await;
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                warn!(error = %err, "connection read error");
                break;
            }
            Ok(None) => {
                debug!("connection closed by peer");
                break;
            }
            Err(_) => {
                warn!("pong deadline exceeded");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => {
                if !handle_text_frame(&text, &user, &channel).await {
                    break;
                }
            }
            WsMessage::Pong(_) => {
                // Deadline reset is implicit: the next loop iteration
                // issues a fresh `pong_wait` timeout.
            }
            WsMessage::Close(_) => {
                debug!("received close frame");
                break;
            }
            _ => {}
        }
    }

    let _ = stop_tx.send(());
    channel.unregister(id).await;
}

/// Decodes and forwards a single text frame. Returns `false` when the
/// frame is malformed and the reader pump must terminate: only a
/// decode `EOF` may be treated as a continuable transport quirk (spec
/// §4.6), and axum hands us complete frames with no streaming-EOF
/// concept, so any decode error here is "a genuine close or any other
/// error" and ends the pump.
async fn handle_text_frame(text: &str, user: &User, channel: &ChannelHandle) -> bool {
    match serde_json::from_str::<Message>(text) {
        Ok(mut msg) if !msg.content.is_empty() => {
            msg.stamp_sender(user.clone());
            channel.broadcast(msg).await;
            true
        }
        Ok(_) => {
            debug!("empty message ignored");
            true
        }
        Err(err) => {
            warn!(error = %err, "malformed frame, terminating reader pump");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::spawn_channel;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    /// A sink that fails every operation, standing in for a connection
    /// whose peer has gone away mid-write.
    struct ErroringSink;

    impl Sink<WsMessage> for ErroringSink {
        type Error = std::io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Err(std::io::Error::other("sink closed")))
        }

        fn start_send(self: Pin<&mut Self>, _item: WsMessage) -> Result<(), Self::Error> {
            Err(std::io::Error::other("sink closed"))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Err(std::io::Error::other("sink closed")))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn writer_pump_terminates_when_a_ping_fails_to_send() {
        let config = Arc::new(Config {
            ping_period: Duration::from_millis(5),
            ..Config::default()
        });
        // Keep both ends alive so only the ping branch can fire; a
        // dropped sender would also unblock the select and defeat the test.
        let (_inbox_tx, inbox_rx) = mpsc::channel(4);
        let (_stop_tx, stop_rx) = oneshot::channel();

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            writer_pump(ErroringSink, inbox_rx, stop_rx, config),
        )
        .await;

        assert!(
            result.is_ok(),
            "writer pump should terminate once a ping send fails, not hang"
        );
    }

    #[tokio::test]
    async fn reader_pump_terminates_and_unregisters_on_pong_deadline_timeout() {
        let config = Arc::new(Config {
            pong_wait: Duration::from_millis(20),
            ..Config::default()
        });
        let channel = spawn_channel(&config);
        let (inbox_tx, _inbox_rx) = mpsc::channel(4);
        channel.register(Receiver { id: 1, inbox: inbox_tx }).await;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let stream = futures_util::stream::pending::<Result<WsMessage, axum::Error>>();

        tokio::time::timeout(
            Duration::from_millis(500),
            reader_pump(stream, User::new("tester"), channel.clone(), 1, config, stop_tx),
        )
        .await
        .expect("reader pump should terminate once the pong deadline elapses");

        assert!(
            stop_rx.try_recv().is_ok(),
            "reader pump should signal the writer pump to stop"
        );

        // Prove the original registration was actually dropped: a fresh
        // receiver under the same id only receives a broadcast if the
        // channel's registrar no longer holds the timed-out one.
        let (probe_tx, mut probe_rx) = mpsc::channel(4);
        channel.register(Receiver { id: 1, inbox: probe_tx }).await;
        channel
            .broadcast(Message {
                sender: User::new("tester"),
                content: "after timeout".to_owned(),
            })
            .await;

        let payload = tokio::time::timeout(Duration::from_millis(200), probe_rx.recv())
            .await
            .expect("re-registration should succeed once the stale receiver is unregistered")
            .expect("probe inbox should receive the broadcast");
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["content"], "after timeout");
    }

    #[tokio::test]
    async fn handle_text_frame_broadcasts_with_the_stamped_sender() {
        let config = Config::default();
        let channel = spawn_channel(&config);
        let (inbox_tx, mut inbox_rx) = mpsc::channel(4);
        channel.register(Receiver { id: 1, inbox: inbox_tx }).await;

        let user = User::new("dpop");
        let ok = handle_text_frame(r#"{"content":"hello"}"#, &user, &channel).await;

        assert!(ok);
        let payload = inbox_rx.recv().await.expect("message delivered");
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["user"]["Name"], "dpop");
        assert_eq!(value["content"], "hello");
    }

    #[tokio::test]
    async fn handle_text_frame_rejects_malformed_json() {
        let config = Config::default();
        let channel = spawn_channel(&config);

        let ok = handle_text_frame("not json at all", &User::new("dpop"), &channel).await;

        assert!(!ok, "a decode failure must signal the reader pump to terminate");
    }

    #[tokio::test]
    async fn handle_text_frame_ignores_empty_content() {
        let config = Config::default();
        let channel = spawn_channel(&config);
        let (inbox_tx, mut inbox_rx) = mpsc::channel(4);
        channel.register(Receiver { id: 1, inbox: inbox_tx }).await;

        let ok = handle_text_frame(r#"{"content":""}"#, &User::new("dpop"), &channel).await;
        assert!(ok, "an empty message is logged and ignored, not terminal");

        channel
            .broadcast(Message {
                sender: User::new("dpop"),
                content: "after".to_owned(),
            })
            .await;
        let payload = inbox_rx.recv().await.expect("only the later message arrives");
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["content"], "after");
    }
}
