//! Subscriber connection lifecycle
//!
//! A session runs two loops over one socket. The inbound loop only watches
//! for liveness and close; the outbound loop is the single writer and drains
//! the connection's queue. Both are generic over `Stream`/`Sink` so they run
//! against axum's socket halves in production and plain channels in tests.

use axum::extract::ws::{close_code, CloseFrame, Message};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::hub::ConnectionHub;
use super::messages::ServerMessage;
use super::queue::OutboundQueue;

/// Why the inbound loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundExit {
    ClosedByPeer,
    ReadError,
    StreamEnded,
    TimedOut,
}

/// Why the outbound loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundExit {
    /// The hub released the connection; a close frame was sent
    QueueClosed,
    WriteFailed,
}

/// Read frames until the peer closes, errors, or goes silent
///
/// Any frame counts as liveness. Data frames are ignored since
/// subscribers are receive-only.
pub async fn run_inbound<S, E>(mut stream: S, client_timeout: Duration) -> InboundExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        let frame = match time::timeout(client_timeout, stream.next()).await {
            Ok(frame) => frame,
            Err(_) => return InboundExit::TimedOut,
        };

        match frame {
            None => return InboundExit::StreamEnded,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket receive error");
                return InboundExit::ReadError;
            }
            Some(Ok(Message::Close(_))) => return InboundExit::ClosedByPeer,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                tracing::trace!("Ignoring data frame from receive-only client");
            }
        }
    }
}

/// Write queued readings to the socket, one frame each
///
/// Sends a ping every `keepalive_interval` whether or not readings are
/// flowing. Receive-only clients answer nothing but pings, so the pongs are
/// what keeps the inbound loop from timing out.
pub async fn run_outbound<S>(
    mut sink: S,
    mut queue: OutboundQueue,
    keepalive_interval: Duration,
) -> OutboundExit
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let connection_id = queue.id();
    let mut keepalive = time::interval_at(Instant::now() + keepalive_interval, keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(reading) = next else {
                    let _ = sink.send(Message::Close(None)).await;
                    return OutboundExit::QueueClosed;
                };

                let text = match ServerMessage::Reading(&reading).to_text() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize reading");
                        continue;
                    }
                };

                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "WebSocket send failed, closing connection"
                    );
                    return OutboundExit::WriteFailed;
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "WebSocket keepalive failed, closing connection"
                    );
                    return OutboundExit::WriteFailed;
                }
            }
        }
    }
}

/// Run a subscriber session to completion
///
/// Registers with the hub, runs both loops, and always leaves the hub
/// without an entry for this connection.
pub async fn serve_socket<S, E>(socket: S, hub: ConnectionHub)
where
    S: Stream<Item = Result<Message, E>> + Sink<Message> + Send + 'static,
    <S as Sink<Message>>::Error: fmt::Display + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let config = hub.config().clone();
    let (mut sink, stream) = socket.split();
    let (handle, queue) = hub.subscriber_channel();

    let connection_id = match hub.register(handle).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register WebSocket connection");
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let mut send_task = tokio::spawn(run_outbound(sink, queue, config.keepalive_interval()));
    let mut recv_task = tokio::spawn(run_inbound(stream, config.client_timeout()));

    tokio::select! {
        exit = &mut send_task => {
            recv_task.abort();
            tracing::debug!(connection_id = %connection_id, exit = ?exit.ok(), "Outbound loop ended");
        }
        exit = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, exit = ?exit.ok(), "Inbound loop ended");
            // Releasing the handle closes the queue so the writer sends a close frame
            let _ = hub.unregister(connection_id).await;
            if time::timeout(config.close_timeout(), &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    }

    let _ = hub.unregister(connection_id).await;
}
