//! READY/ACK handshake.
//!
//! The render context broadcasts `READY` on a fixed interval until it sees `ACK`.
//! The host answers the first `READY` with `ACK`, becomes operational, and flushes
//! every command it buffered before acknowledgment in the original order.
//!
//! Both halves are plain state machines; the actors in `session` drive them.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::protocol::{Message, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakePhase {
    WaitingForReady,
    ReadyBroadcasting,
    AckReceived,
    Operational,
}

// ────────────────────────────────────────────────────────────────────────────
// Render side
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RenderHandshake {
    phase: HandshakePhase,
    interval: Duration,
    broadcasts: u32,
}

impl RenderHandshake {
    pub fn new(interval: Duration) -> Self {
        Self {
            phase: HandshakePhase::WaitingForReady,
            interval,
            broadcasts: 0,
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn broadcasts(&self) -> u32 {
        self.broadcasts
    }

    /// True until the first `ACK` arrives.
    pub fn should_broadcast(&self) -> bool {
        matches!(
            self.phase,
            HandshakePhase::WaitingForReady | HandshakePhase::ReadyBroadcasting
        )
    }

    pub fn on_broadcast(&mut self) {
        self.broadcasts += 1;
        if self.phase == HandshakePhase::WaitingForReady {
            self.transition(HandshakePhase::ReadyBroadcasting);
        }
    }

    /// Returns `false` for a duplicate `ACK`.
    pub fn on_ack(&mut self) -> bool {
        if !self.should_broadcast() {
            return false;
        }
        self.transition(HandshakePhase::AckReceived);
        self.transition(HandshakePhase::Operational);
        true
    }

    fn transition(&mut self, next: HandshakePhase) {
        debug!(from = ?self.phase, to = ?next, "render handshake");
        self.phase = next;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Host side
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct HostHandshake {
    phase: HandshakePhase,
    outbox: VecDeque<Message>,
    ready_tx: watch::Sender<bool>,
}

impl HostHandshake {
    pub fn new() -> (Self, ReadySignal) {
        let (ready_tx, ready_rx) = watch::channel(false);
        let handshake = Self {
            phase: HandshakePhase::WaitingForReady,
            outbox: VecDeque::new(),
            ready_tx,
        };
        (handshake, ReadySignal { rx: ready_rx })
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn buffered(&self) -> usize {
        self.outbox.len()
    }

    /// Routes an outgoing command: returned messages are safe to send now,
    /// anything else is held until acknowledgment.
    pub fn outgoing(&mut self, message: Message) -> Vec<Message> {
        if self.phase == HandshakePhase::Operational {
            vec![message]
        } else {
            self.outbox.push_back(message);
            Vec::new()
        }
    }

    /// Handles `READY`. The first one yields `ACK` followed by every buffered
    /// command in arrival order; later ones yield nothing.
    pub fn on_ready(&mut self) -> Vec<Message> {
        if self.phase == HandshakePhase::Operational {
            debug!("ignoring READY after acknowledgment");
            return Vec::new();
        }
        self.phase = HandshakePhase::AckReceived;

        let mut flush = Vec::with_capacity(self.outbox.len() + 1);
        flush.push(Message::Ack);
        flush.extend(self.outbox.drain(..));

        self.phase = HandshakePhase::Operational;
        self.ready_tx.send_replace(true);
        flush
    }
}

/// Resolves once the host has acknowledged the render context.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<bool>,
}

impl ReadySignal {
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for acknowledgment, failing after `timeout` instead of waiting forever.
    pub async fn wait(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        match tokio::time::timeout(timeout, self.rx.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ProtocolError::Closed),
            Err(_) => Err(ProtocolError::HandshakeTimeout(timeout)),
        }
    }
}
