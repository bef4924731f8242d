//! Host context actor and the handle callers drive it with.
//!
//! Commands issued before the render context has been acknowledged are held by
//! the host handshake and flushed, in order, right after `ACK`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::autofit::FitResult;
use crate::models::{Measurement, StyleSnapshot};
use crate::protocol::{HostHandshake, Message, Port, ProtocolError, ReadySignal};

/// What the host knows from the render context's status events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostStatus {
    pub controls_enabled: bool,
    pub last_measurement: Option<Measurement>,
    pub last_error: Option<String>,
}

impl Default for HostStatus {
    fn default() -> Self {
        Self {
            controls_enabled: true,
            last_measurement: None,
            last_error: None,
        }
    }
}

/// Published on every `RENDER_COMPLETE`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCompletion {
    pub measurement: Option<Measurement>,
    /// Result of the most recent auto-fit run, if any has finished.
    pub fit: Option<FitResult>,
    /// Number of auto-fit runs finished when this completion arrived.
    pub fits_completed: u64,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct HostHandle {
    commands: mpsc::UnboundedSender<Message>,
    ready: ReadySignal,
    status: watch::Receiver<HostStatus>,
    completion: watch::Receiver<Option<RenderCompletion>>,
    fits_requested: Arc<AtomicU64>,
}

impl HostHandle {
    pub fn set_content(&self, markdown: impl Into<String>) -> Result<(), ProtocolError> {
        self.command(Message::SetContent {
            markdown: markdown.into(),
        })
    }

    pub fn update_styles(&self, styles: StyleSnapshot) -> Result<(), ProtocolError> {
        self.command(Message::UpdateStyles { styles })
    }

    pub fn print(&self) -> Result<(), ProtocolError> {
        self.command(Message::Print)
    }

    pub fn set_view_option(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        self.command(Message::SetViewOption {
            name: name.into(),
            value: value.into(),
        })
    }

    pub fn fit_to_page(&self) -> Result<(), ProtocolError> {
        self.fits_requested.fetch_add(1, Ordering::SeqCst);
        self.command(Message::FitToPage)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), ProtocolError> {
        self.ready.clone().wait(timeout).await
    }

    /// Waits for a `RENDER_COMPLETE` that follows every auto-fit requested through
    /// this handle so far.
    pub async fn wait_render_complete(
        &self,
        timeout: Duration,
    ) -> Result<RenderCompletion, ProtocolError> {
        let wanted = self.fits_requested.load(Ordering::SeqCst);
        let mut completion = self.completion.clone();
        let waited = tokio::time::timeout(
            timeout,
            completion.wait_for(|c| c.as_ref().is_some_and(|c| c.fits_completed >= wanted)),
        )
        .await;
        match waited {
            Ok(Ok(done)) => done.clone().ok_or(ProtocolError::Closed),
            Ok(Err(_)) => Err(ProtocolError::Closed),
            Err(_) => Err(ProtocolError::RenderTimeout(timeout)),
        }
    }

    pub fn status(&self) -> HostStatus {
        self.status.borrow().clone()
    }

    fn command(&self, message: Message) -> Result<(), ProtocolError> {
        self.commands.send(message).map_err(|_| ProtocolError::Closed)
    }
}

pub struct HostContext {
    port: Port,
    handshake: HostHandshake,
    commands: mpsc::UnboundedReceiver<Message>,
    status: watch::Sender<HostStatus>,
    completion: watch::Sender<Option<RenderCompletion>>,
    last_fit: Option<FitResult>,
    fits_completed: u64,
}

impl HostContext {
    pub fn new(port: Port) -> (Self, HostHandle) {
        let (handshake, ready) = HostHandshake::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(HostStatus::default());
        let (completion_tx, completion_rx) = watch::channel(None);

        let context = Self {
            port,
            handshake,
            commands: commands_rx,
            status: status_tx,
            completion: completion_tx,
            last_fit: None,
            fits_completed: 0,
        };
        let handle = HostHandle {
            commands: commands_tx,
            ready,
            status: status_rx,
            completion: completion_rx,
            fits_requested: Arc::new(AtomicU64::new(0)),
        };
        (context, handle)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All host handles dropped, host context stopping");
                        break;
                    };
                    let ready = self.handshake.outgoing(command);
                    if self.send_all(ready).is_err() {
                        break;
                    }
                }
                message = self.port.recv() => {
                    let Some(message) = message else {
                        info!("Render context closed, host context stopping");
                        break;
                    };
                    if self.handle(message).is_err() {
                        break;
                    }
                }
            }
        }
    }

    fn handle(&mut self, message: Message) -> Result<(), ProtocolError> {
        match message {
            Message::Ready => {
                let flush = self.handshake.on_ready();
                if !flush.is_empty() {
                    info!(buffered = flush.len() - 1, "Render context ready, sending ACK");
                }
                self.send_all(flush)?;
            }
            Message::Rendering => {
                self.status.send_modify(|s| s.controls_enabled = false);
            }
            Message::Rendered { measurement } => {
                debug!(
                    page_count = measurement.page_count,
                    fill_ratio = ?measurement.fill_ratio,
                    "Render finished"
                );
                self.status.send_modify(|s| {
                    s.controls_enabled = true;
                    s.last_measurement = Some(measurement);
                    s.last_error = None;
                });
            }
            Message::RenderError { message } => {
                warn!("Render context reported an error: {message}");
                self.status.send_modify(|s| {
                    s.controls_enabled = true;
                    s.last_error = Some(message);
                });
            }
            Message::AutoFitResult { result } => {
                info!(
                    success = result.success,
                    iterations = result.iterations,
                    termination = ?result.termination,
                    "Auto-fit result received"
                );
                self.fits_completed += 1;
                self.last_fit = Some(result);
            }
            Message::RenderComplete { measurement } => {
                let last_error = self.status.borrow().last_error.clone();
                self.completion.send_replace(Some(RenderCompletion {
                    measurement,
                    fit: self.last_fit.clone(),
                    fits_completed: self.fits_completed,
                    last_error,
                }));
            }
            other => warn!(kind = other.kind(), "Host ignoring render-bound message"),
        }
        Ok(())
    }

    fn send_all(&self, messages: Vec<Message>) -> Result<(), ProtocolError> {
        for message in messages {
            self.port.send(&message).inspect_err(|e| {
                warn!(kind = message.kind(), "Could not reach render context: {e}");
            })?;
        }
        Ok(())
    }
}
