//! Session channel: the transport-neutral duplex a Turn talks through.
//!
//! Two framings share one type:
//! - **duplex** (WebSocket): inbound text frames arrive on a receiver, so a
//!   permission gate can wait for the client's decision
//! - **request/stream** (SSE): the single request body is the only inbound
//!   message and there is no way to ask the client anything mid-Turn
//!
//! Outbound events go through a bounded sender in production order; the
//! transport task drains it.

use relay_core::{RelayError, WireEvent};
use tokio::sync::mpsc;
use tracing::trace;

/// Framing mode of a [`SessionChannel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    /// Persistent connection with an inbound side.
    Duplex,
    /// One request in, a stream of events out.
    RequestStream,
}

/// One client's transport, as seen by the Turn driver.
#[derive(Debug)]
pub struct SessionChannel {
    outbound: mpsc::Sender<WireEvent>,
    inbound: Option<mpsc::Receiver<String>>,
}

impl SessionChannel {
    /// A duplex channel fed by `inbound` text frames.
    pub fn duplex(outbound: mpsc::Sender<WireEvent>, inbound: mpsc::Receiver<String>) -> Self {
        Self {
            outbound,
            inbound: Some(inbound),
        }
    }

    /// A request/stream channel with no inbound side.
    pub fn request_stream(outbound: mpsc::Sender<WireEvent>) -> Self {
        Self {
            outbound,
            inbound: None,
        }
    }

    /// Framing mode.
    pub fn mode(&self) -> ChannelMode {
        if self.inbound.is_some() {
            ChannelMode::Duplex
        } else {
            ChannelMode::RequestStream
        }
    }

    /// Whether inbound messages can arrive.
    pub fn has_inbound(&self) -> bool {
        self.inbound.is_some()
    }

    /// Whether the transport has stopped draining outbound events.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Send one event to the client.
    pub async fn send(&self, event: WireEvent) -> Result<(), RelayError> {
        trace!(kind = event.kind(), "outbound event");
        self.outbound
            .send(event)
            .await
            .map_err(|e| RelayError::Transport(format!("client gone, dropped {}", e.0.kind())))
    }

    /// Next inbound text message.
    ///
    /// `None` once the client has disconnected, and always `None` for a
    /// request/stream channel.
    pub async fn recv(&mut self) -> Option<String> {
        match self.inbound.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn duplex_round_trip() {
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let (in_tx, in_rx) = mpsc::channel(4);
        let mut channel = SessionChannel::duplex(out_tx, in_rx);
        assert_eq!(channel.mode(), ChannelMode::Duplex);

        channel.send(WireEvent::StreamOpen).await.unwrap();
        assert_eq!(out_rx.recv().await, Some(WireEvent::StreamOpen));

        in_tx.send("{\"prompt\":\"hi\"}".into()).await.unwrap();
        assert_eq!(channel.recv().await.as_deref(), Some("{\"prompt\":\"hi\"}"));

        drop(in_tx);
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test]
    async fn request_stream_has_no_inbound() {
        let (out_tx, _out_rx) = mpsc::channel(4);
        let mut channel = SessionChannel::request_stream(out_tx);
        assert_eq!(channel.mode(), ChannelMode::RequestStream);
        assert!(!channel.has_inbound());
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_client_gone_is_transport_error() {
        let (out_tx, out_rx) = mpsc::channel(4);
        let channel = SessionChannel::request_stream(out_tx);
        drop(out_rx);
        assert!(channel.is_closed());
        assert_matches!(
            channel.send(WireEvent::StreamClose).await,
            Err(RelayError::Transport(_))
        );
    }
}
