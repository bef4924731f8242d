//! Render executor: one measured pass at a time over a stateful oracle.
//!
//! # Single flight
//! The oracle lives behind a `tokio::sync::Mutex`. `submit` only `try_lock`s it:
//! when a pass is already running the request is parked in a one-slot pending
//! cell (last write wins) and the running caller picks it up once its own pass has
//! fully settled. `execute` waits for the lock instead, for callers that need the
//! measurement of their own snapshot (the auto-fit loop).
//!
//! Pending requests are drained in a loop by whoever holds the lock, never by
//! recursion.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::layout::markup::parse_markdown;
use crate::models::{Measurement, StyleSnapshot};
use crate::queue::RenderReason;
use crate::render::oracle::{ContentBaseline, OracleError, PaginationOracle, PAGE_GEOMETRY_RULE};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("no content loaded")]
    NoContent,

    #[error("pagination oracle failed: {0}")]
    Oracle(String),
}

impl From<OracleError> for RenderError {
    fn from(e: OracleError) -> Self {
        RenderError::Oracle(e.0)
    }
}

/// A merged render request: the full style snapshot plus why it was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub styles: StyleSnapshot,
    pub reasons: Vec<RenderReason>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// This caller ran the request and every request parked meanwhile.
    Ran {
        result: Result<Measurement, RenderError>,
        passes: u32,
    },
    /// A pass was in flight; the request now occupies the pending slot.
    Parked,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Started,
    Finished { measurement: Measurement },
    Failed { message: String },
}

/// Receives status events around every pass.
pub trait RenderObserver: Send + Sync {
    fn on_event(&self, event: &RenderEvent);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderState {
    pub is_rendering: bool,
    pub last_render_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_measurement: Option<Measurement>,
    pub passes: u64,
    /// Parked requests replaced by a later one before they ran.
    pub coalesced: u64,
}

/// Clears `is_rendering` however the pass ends, including when its future is dropped.
struct InFlight<'a> {
    state: &'a Mutex<RenderState>,
}

impl<'a> InFlight<'a> {
    fn enter(state: &'a Mutex<RenderState>) -> Self {
        lock(state).is_rendering = true;
        Self { state }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.state).is_rendering = false;
    }
}

pub struct RenderExecutor<O: PaginationOracle> {
    oracle: tokio::sync::Mutex<O>,
    baseline: Mutex<Option<Arc<ContentBaseline>>>,
    state: Mutex<RenderState>,
    pending: Mutex<Option<RenderRequest>>,
    observer: Option<Arc<dyn RenderObserver>>,
}

impl<O: PaginationOracle> RenderExecutor<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle: tokio::sync::Mutex::new(oracle),
            baseline: Mutex::new(None),
            state: Mutex::new(RenderState::default()),
            pending: Mutex::new(None),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RenderObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Parses `markdown` and captures it as the new pristine baseline.
    pub fn load_content(&self, markdown: &str) -> Arc<ContentBaseline> {
        let baseline = ContentBaseline::capture(parse_markdown(markdown));
        *lock(&self.baseline) = Some(Arc::clone(&baseline));
        info!(
            blocks = baseline.markup.blocks().len(),
            words = baseline.markup.stats().word_count,
            "Content baseline captured"
        );
        baseline
    }

    pub fn baseline(&self) -> Option<Arc<ContentBaseline>> {
        lock(&self.baseline).clone()
    }

    pub fn state(&self) -> RenderState {
        lock(&self.state).clone()
    }

    pub fn is_rendering(&self) -> bool {
        lock(&self.state).is_rendering
    }

    pub fn last_measurement(&self) -> Option<Measurement> {
        lock(&self.state).last_measurement.clone()
    }

    /// Runs `request` unless a pass is in flight, in which case it is parked.
    pub async fn submit(&self, request: RenderRequest) -> SubmitOutcome {
        let Ok(mut oracle) = self.oracle.try_lock() else {
            self.park(request);
            return SubmitOutcome::Parked;
        };

        debug!(reasons = ?request.reasons, "Render pass requested");
        let first = self.run_pass(&mut oracle, &request.styles).await;
        let (result, drained) = self.drain_pending(oracle, first).await;

        SubmitOutcome::Ran {
            result,
            passes: 1 + drained,
        }
    }

    /// Waits for any in-flight pass, then runs one pass with `styles` and
    /// returns its measurement. Requests parked meanwhile run afterwards.
    pub async fn execute(&self, styles: &StyleSnapshot) -> Result<Measurement, RenderError> {
        let mut oracle = self.oracle.lock().await;
        let result = self.run_pass(&mut oracle, styles).await;
        // Their own outcomes reach the observer; the caller gets the first.
        self.drain_pending(oracle, result.clone()).await;
        result
    }

    /// Printable output of the current document, after any in-flight pass settles.
    pub async fn print(&self) -> Result<String, RenderError> {
        let oracle = self.oracle.lock().await;
        if self.baseline().is_none() {
            return Err(RenderError::NoContent);
        }
        Ok(oracle.printable()?)
    }

    fn park(&self, request: RenderRequest) {
        let replaced = lock(&self.pending).replace(request).is_some();
        if replaced {
            lock(&self.state).coalesced += 1;
        }
        debug!(replaced, "Render in flight, request parked");
    }

    fn take_pending(&self) -> Option<RenderRequest> {
        lock(&self.pending).take()
    }

    /// Runs parked requests until the pending slot stays empty across an unlock.
    /// Returns the last result and the number of extra passes.
    async fn drain_pending(
        &self,
        mut oracle: tokio::sync::MutexGuard<'_, O>,
        mut last: Result<Measurement, RenderError>,
    ) -> (Result<Measurement, RenderError>, u32) {
        let mut passes = 0;
        loop {
            while let Some(next) = self.take_pending() {
                debug!(reasons = ?next.reasons, "Running pending render request");
                last = self.run_pass(&mut oracle, &next.styles).await;
                passes += 1;
            }
            drop(oracle);

            // A request parked between the last take and the unlock must not be stranded.
            if lock(&self.pending).is_none() {
                break;
            }
            match self.oracle.try_lock() {
                Ok(guard) => oracle = guard,
                Err(_) => break,
            }
        }
        (last, passes)
    }

    async fn run_pass(&self, oracle: &mut O, styles: &StyleSnapshot) -> Result<Measurement, RenderError> {
        let _in_flight = InFlight::enter(&self.state);
        self.emit(&RenderEvent::Started);

        let result = self.measured_pass(oracle, styles).await;
        match &result {
            Ok(measurement) => {
                {
                    let mut state = lock(&self.state);
                    state.last_render_time = Some(Utc::now());
                    state.last_error = None;
                    state.last_measurement = Some(measurement.clone());
                    state.passes += 1;
                }
                debug!(
                    page_count = measurement.page_count,
                    fill_ratio = ?measurement.fill_ratio,
                    "Render pass finished"
                );
                self.emit(&RenderEvent::Finished {
                    measurement: measurement.clone(),
                });
            }
            Err(e) => {
                if let Some(baseline) = self.baseline() {
                    oracle.load(&baseline);
                }
                lock(&self.state).last_error = Some(e.to_string());
                warn!("Render pass failed, document rolled back to baseline: {e}");
                self.emit(&RenderEvent::Failed {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    async fn measured_pass(&self, oracle: &mut O, styles: &StyleSnapshot) -> Result<Measurement, RenderError> {
        let baseline = self.baseline().ok_or(RenderError::NoContent)?;
        oracle.load(&baseline);
        for (name, value) in styles {
            oracle.set_style_variable(name, value);
        }
        oracle.append_head_rule(PAGE_GEOMETRY_RULE);

        oracle.preview().await?;
        Ok(Measurement::from_geometry(
            oracle.page_count(),
            &oracle.geometry(),
        ))
    }

    fn emit(&self, event: &RenderEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
