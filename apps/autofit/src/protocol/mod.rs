//! Message channel between the host context and the render context.
//! The two contexts share no memory: every exchange is an encoded JSON message.
//! Write ownership is partitioned per direction, so no cross-context locking exists.

pub mod handshake;
pub mod messages;

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

pub use handshake::{HandshakePhase, HostHandshake, ReadySignal, RenderHandshake};
pub use messages::Message;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("{kind} may only be sent by the {allowed} context")]
    WrongDirection { kind: &'static str, allowed: Side },

    #[error("peer context closed the channel")]
    Closed,

    #[error("render context did not signal READY within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("render did not complete within {0:?}")]
    RenderTimeout(Duration),
}

/// Which execution context a port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Host,
    Render,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Host => write!(f, "host"),
            Side::Render => write!(f, "render"),
        }
    }
}

/// Sending half of a port. Cheap to clone; refuses messages the owning side
/// does not originate.
#[derive(Debug, Clone)]
pub struct PortSender {
    side: Side,
    tx: mpsc::UnboundedSender<String>,
}

impl PortSender {
    pub fn send(&self, message: &Message) -> Result<(), ProtocolError> {
        if message.origin() != self.side {
            return Err(ProtocolError::WrongDirection {
                kind: message.kind(),
                allowed: message.origin(),
            });
        }
        let raw = message.to_wire()?;
        self.tx.send(raw).map_err(|_| ProtocolError::Closed)
    }

    pub fn side(&self) -> Side {
        self.side
    }
}

/// One end of the duplex channel.
#[derive(Debug)]
pub struct Port {
    sender: PortSender,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Port {
    pub fn send(&self, message: &Message) -> Result<(), ProtocolError> {
        self.sender.send(message)
    }

    pub fn sender(&self) -> PortSender {
        self.sender.clone()
    }

    /// Receives the next message. `None` once the peer has gone away.
    /// Malformed payloads are logged and skipped.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            let raw = self.rx.recv().await?;
            match Message::from_wire(&raw) {
                Ok(message) => return Some(message),
                Err(e) => warn!(side = %self.sender.side, "Dropping undecodable message: {e}"),
            }
        }
    }
}

/// Creates a connected `(host, render)` pair of ports.
pub fn duplex() -> (Port, Port) {
    let (host_tx, render_rx) = mpsc::unbounded_channel();
    let (render_tx, host_rx) = mpsc::unbounded_channel();
    let host = Port {
        sender: PortSender {
            side: Side::Host,
            tx: host_tx,
        },
        rx: host_rx,
    };
    let render = Port {
        sender: PortSender {
            side: Side::Render,
            tx: render_tx,
        },
        rx: render_rx,
    };
    (host, render)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplex_delivers_both_directions() {
        let (mut host, mut render) = duplex();
        render.send(&Message::Ready).unwrap();
        host.send(&Message::Ack).unwrap();

        assert_eq!(host.recv().await, Some(Message::Ready));
        assert_eq!(render.recv().await, Some(Message::Ack));
    }

    #[tokio::test]
    async fn test_wrong_direction_rejected() {
        let (host, _render) = duplex();
        let err = host.send(&Message::Ready).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::WrongDirection {
                kind: "READY",
                allowed: Side::Render
            }
        ));
    }

    #[tokio::test]
    async fn test_recv_none_after_peer_dropped() {
        let (mut host, render) = duplex();
        drop(render);
        assert_eq!(host.recv().await, None);
        assert!(matches!(host.send(&Message::Ack), Err(ProtocolError::Closed)));
    }

    #[tokio::test]
    async fn test_malformed_payload_skipped() {
        let (mut host, render) = duplex();
        render.sender.tx.send("not json".to_string()).unwrap();
        render.send(&Message::Rendering).unwrap();
        assert_eq!(host.recv().await, Some(Message::Rendering));
    }
}
