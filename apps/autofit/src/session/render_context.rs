//! Render context actor: owns the store, queue, executor and auto-fit engine.
//!
//! A single `select!` loop drives the READY broadcast, inbound host commands and
//! the debounce deadline. Passes and auto-fit runs are spawned so the loop keeps
//! draining commands while the oracle works.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::autofit::{AutoFitEngine, StyleParameter};
use crate::protocol::{Message, Port, PortSender, RenderHandshake};
use crate::queue::{lock_queue, MergedTasks, SharedQueue};
use crate::render::{
    PaginationOracle, RenderEvent, RenderExecutor, RenderObserver, RenderRequest, SubmitOutcome,
};
use crate::store::{Action, Store};

/// Relays executor events into the store and out to the host as status messages.
pub struct StatusRelay {
    store: Arc<Store>,
    port: PortSender,
}

impl StatusRelay {
    pub fn new(store: Arc<Store>, port: PortSender) -> Self {
        Self { store, port }
    }
}

impl RenderObserver for StatusRelay {
    fn on_event(&self, event: &RenderEvent) {
        let (action, message) = match event {
            RenderEvent::Started => (Action::RenderStarted, Message::Rendering),
            RenderEvent::Finished { measurement } => (
                Action::RenderSucceeded {
                    measurement: measurement.clone(),
                },
                Message::Rendered {
                    measurement: measurement.clone(),
                },
            ),
            RenderEvent::Failed { message } => (
                Action::RenderFailed {
                    message: message.clone(),
                },
                Message::RenderError {
                    message: message.clone(),
                },
            ),
        };
        self.store.dispatch(action);
        if let Err(e) = self.port.send(&message) {
            debug!("Status not delivered to host: {e}");
        }
    }
}

pub struct RenderContext<O: PaginationOracle> {
    port: Port,
    handshake: RenderHandshake,
    store: Arc<Store>,
    queue: SharedQueue,
    executor: Arc<RenderExecutor<O>>,
    engine: Arc<AutoFitEngine>,
    printed: Arc<Mutex<Option<String>>>,
    /// `Some(n)` while a run is in progress; `n` requests joined it late.
    fit_joiners: Arc<Mutex<Option<u32>>>,
}

impl<O: PaginationOracle> RenderContext<O> {
    pub fn new(
        port: Port,
        handshake: RenderHandshake,
        store: Arc<Store>,
        queue: SharedQueue,
        executor: Arc<RenderExecutor<O>>,
        engine: Arc<AutoFitEngine>,
        printed: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            port,
            handshake,
            store,
            queue,
            executor,
            engine,
            printed,
            fit_joiners: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn run(mut self) {
        let mut ready_ticker = tokio::time::interval(self.handshake.interval());
        ready_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let until_due = lock_queue(&self.queue).time_until_due();
            tokio::select! {
                _ = ready_ticker.tick(), if self.handshake.should_broadcast() => {
                    if self.port.send(&Message::Ready).is_err() {
                        break;
                    }
                    self.handshake.on_broadcast();
                }
                message = self.port.recv() => {
                    let Some(message) = message else {
                        info!("Host context closed, render context stopping");
                        break;
                    };
                    self.handle(message);
                }
                _ = tokio::time::sleep(until_due.unwrap_or_default()), if until_due.is_some() => {
                    let merged = lock_queue(&self.queue).take_due();
                    if let Some(merged) = merged {
                        self.spawn_pass(merged);
                    }
                }
            }
        }
    }

    fn handle(&mut self, message: Message) {
        debug!(kind = message.kind(), "Render context received message");
        match message {
            Message::Ack => {
                if self.handshake.on_ack() {
                    info!(
                        broadcasts = self.handshake.broadcasts(),
                        "Handshake complete, READY broadcast stopped"
                    );
                }
            }
            Message::SetContent { markdown } => {
                self.executor.load_content(&markdown);
                self.store.dispatch(Action::ContentLoaded { markdown });
            }
            Message::UpdateStyles { styles } => {
                self.store.dispatch(Action::StylesUpdated { styles });
            }
            Message::Print => self.spawn_print(),
            Message::FitToPage => self.spawn_fit(),
            Message::SetViewOption { name, value } => {
                self.store.dispatch(Action::ViewOptionChanged { name, value });
            }
            other => warn!(kind = other.kind(), "Render context ignoring host-bound message"),
        }
    }

    fn spawn_pass(&self, merged: MergedTasks) {
        let executor = Arc::clone(&self.executor);
        let store = Arc::clone(&self.store);
        let port = self.port.sender();
        let request = RenderRequest {
            styles: store.snapshot().styles,
            reasons: merged.reasons(),
        };
        tokio::spawn(async move {
            let SubmitOutcome::Ran { result, passes } = executor.submit(request).await else {
                return;
            };
            debug!(passes, "Debounced render settled");
            // A running auto-fit owns the completion signal.
            if !store.snapshot().ui.auto_fitting {
                send(
                    &port,
                    Message::RenderComplete {
                        measurement: result.ok(),
                    },
                );
            }
        });
    }

    fn spawn_fit(&self) {
        {
            let mut joiners = lock(&self.fit_joiners);
            if let Some(joined) = joiners.as_mut() {
                *joined += 1;
                info!(joined = *joined, "FIT_TO_PAGE joined the auto-fit run in progress");
                return;
            }
            *joiners = Some(0);
            self.store.dispatch(Action::AutoFitStarted);
        }

        let executor = Arc::clone(&self.executor);
        let store = Arc::clone(&self.store);
        let engine = Arc::clone(&self.engine);
        let joiners = Arc::clone(&self.fit_joiners);
        let port = self.port.sender();
        let flushed = lock_queue(&self.queue).flush();

        tokio::spawn(async move {
            if let Some(merged) = flushed {
                let request = RenderRequest {
                    styles: store.snapshot().styles,
                    reasons: merged.reasons(),
                };
                executor.submit(request).await;
            }

            let base = store.snapshot().styles;
            let step_store = Arc::clone(&store);
            let result = engine
                .run(executor.as_ref(), &base, move |param: &StyleParameter| {
                    step_store.dispatch(Action::FitStepApplied {
                        variable: param.variable.clone(),
                        value: param.css_value(),
                    });
                })
                .await;

            // Every request that joined this run is answered with its result.
            let joined = {
                let mut joiners = lock(&joiners);
                store.dispatch(Action::AutoFitFinished {
                    result: result.clone(),
                });
                joiners.take().unwrap_or_default()
            };
            for _ in 0..=joined {
                send(
                    &port,
                    Message::AutoFitResult {
                        result: result.clone(),
                    },
                );
            }
            send(
                &port,
                Message::RenderComplete {
                    measurement: executor.last_measurement(),
                },
            );
        });
    }

    fn spawn_print(&self) {
        let executor = Arc::clone(&self.executor);
        let printed = Arc::clone(&self.printed);
        let port = self.port.sender();
        tokio::spawn(async move {
            match executor.print().await {
                Ok(html) => {
                    info!(bytes = html.len(), "Printable output produced");
                    *lock(&printed) = Some(html);
                }
                Err(e) => {
                    warn!("Print failed: {e}");
                    send(
                        &port,
                        Message::RenderError {
                            message: e.to_string(),
                        },
                    );
                }
            }
        });
    }
}

fn send(port: &PortSender, message: Message) {
    if let Err(e) = port.send(&message) {
        warn!(kind = message.kind(), "Could not reach host: {e}");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::{timeout, Instant};

    use super::*;
    use crate::autofit::{FitConfig, Termination};
    use crate::models::FillGeometry;
    use crate::protocol::duplex;
    use crate::queue::{self, MonotonicClock, QueueSettings, RenderTaskQueue};
    use crate::render::{ContentBaseline, OracleError};

    /// One page at 90% fill; every preview takes 50ms of (paused) time.
    #[derive(Default)]
    struct SteadyOracle {
        previews: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl PaginationOracle for SteadyOracle {
        fn load(&mut self, _baseline: &ContentBaseline) {}

        fn set_style_variable(&mut self, _name: &str, _value: &str) {}

        fn append_head_rule(&mut self, _rule: &str) {}

        async fn preview(&mut self) -> Result<(), OracleError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            *lock(&self.previews) += 1;
            Ok(())
        }

        fn page_count(&self) -> u32 {
            1
        }

        fn geometry(&self) -> FillGeometry {
            FillGeometry {
                content_top: 0.0,
                last_visible_bottom: Some(900.0),
                scroll_height: 900.0,
                page_height: 1000.0,
            }
        }

        fn printable(&self) -> Result<String, OracleError> {
            Ok(String::new())
        }
    }

    fn spawn_context(oracle: SteadyOracle) -> (Port, Arc<Store>) {
        let (host_port, render_port) = duplex();
        let store = Arc::new(Store::new());
        let queue = RenderTaskQueue::shared(Arc::new(MonotonicClock::new()), QueueSettings::default());
        queue::attach(&queue, &store);
        let relay = StatusRelay::new(Arc::clone(&store), render_port.sender());
        let executor = Arc::new(RenderExecutor::new(oracle).with_observer(Arc::new(relay)));
        let context = RenderContext::new(
            render_port,
            RenderHandshake::new(Duration::from_millis(100)),
            Arc::clone(&store),
            queue,
            executor,
            Arc::new(AutoFitEngine::new(FitConfig::default())),
            Arc::new(Mutex::new(None)),
        );
        tokio::spawn(context.run());
        (host_port, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_repeats_on_interval_until_ack() {
        let (mut host_port, _store) = spawn_context(SteadyOracle::default());
        let start = Instant::now();

        for expected_ms in [0, 100, 200] {
            assert_eq!(host_port.recv().await, Some(Message::Ready));
            assert_eq!(start.elapsed(), Duration::from_millis(expected_ms));
        }
        host_port.send(&Message::Ack).unwrap();

        let after_ack = timeout(Duration::from_secs(1), host_port.recv()).await;
        assert!(after_ack.is_err(), "READY kept broadcasting after ACK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fit_request_during_a_run_is_answered_by_that_run() {
        let oracle = SteadyOracle::default();
        let previews = Arc::clone(&oracle.previews);
        let (mut host_port, store) = spawn_context(oracle);
        assert_eq!(host_port.recv().await, Some(Message::Ready));
        host_port.send(&Message::Ack).unwrap();

        host_port
            .send(&Message::SetContent {
                markdown: "# CV\n\nBody".to_string(),
            })
            .unwrap();
        host_port.send(&Message::FitToPage).unwrap();
        host_port.send(&Message::FitToPage).unwrap();

        let mut results = Vec::new();
        loop {
            match host_port.recv().await {
                Some(Message::AutoFitResult { result }) => results.push(result),
                Some(Message::RenderComplete { measurement }) => {
                    assert_eq!(measurement.map(|m| m.page_count), Some(1));
                    break;
                }
                Some(_) => {}
                None => panic!("render context stopped"),
            }
        }

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.termination == Termination::AlreadyAcceptable));
        // flushed content pass plus the initial measurement of a single run
        assert_eq!(*lock(&previews), 2);
        let ui = store.snapshot().ui;
        assert!(!ui.auto_fitting);
        assert!(ui.controls_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_option_schedules_a_render() {
        let (mut host_port, store) = spawn_context(SteadyOracle::default());
        assert_eq!(host_port.recv().await, Some(Message::Ready));
        host_port.send(&Message::Ack).unwrap();
        host_port
            .send(&Message::SetContent {
                markdown: "Body".to_string(),
            })
            .unwrap();
        host_port
            .send(&Message::SetViewOption {
                name: "show-guides".to_string(),
                value: "on".to_string(),
            })
            .unwrap();

        loop {
            match host_port.recv().await {
                Some(Message::RenderComplete { measurement }) => {
                    assert!(measurement.is_some());
                    break;
                }
                Some(_) => {}
                None => panic!("render context stopped"),
            }
        }
        let state = store.snapshot();
        assert_eq!(state.ui.view_options["show-guides"], "on");
        assert_eq!(state.render.passes, 1);
    }
}
