//! One host context and one render context wired over an in-process duplex
//! channel. Each context is a tokio task; they share nothing but the channel.

pub mod host;
pub mod render_context;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::autofit::{AutoFitEngine, FitConfig};
use crate::models::StyleSnapshot;
use crate::protocol::{duplex, ProtocolError, RenderHandshake};
use crate::queue::{self, MonotonicClock, QueueSettings, RenderTaskQueue};
use crate::render::{PaginationOracle, RenderExecutor, RenderReport};
use crate::store::Store;

pub use host::{HostContext, HostHandle, HostStatus, RenderCompletion};
pub use render_context::{RenderContext, StatusRelay};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ready_interval: Duration,
    pub handshake_timeout: Duration,
    pub render_timeout: Duration,
    pub queue: QueueSettings,
    pub fit: FitConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ready_interval: Duration::from_millis(100),
            handshake_timeout: Duration::from_millis(5000),
            render_timeout: Duration::from_millis(15000),
            queue: QueueSettings::default(),
            fit: FitConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("render failed: {0}")]
    Render(String),
}

pub struct Session<O: PaginationOracle> {
    host: HostHandle,
    store: Arc<Store>,
    executor: Arc<RenderExecutor<O>>,
    printed: Arc<Mutex<Option<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<O: PaginationOracle> Session<O> {
    /// Spawns both contexts. The render context starts broadcasting READY at once.
    pub fn start(oracle: O, settings: &SessionSettings) -> Self {
        let (host_port, render_port) = duplex();

        let store = Arc::new(Store::new());
        let queue = RenderTaskQueue::shared(Arc::new(MonotonicClock::new()), settings.queue);
        queue::attach(&queue, &store);

        let relay = StatusRelay::new(Arc::clone(&store), render_port.sender());
        let executor = Arc::new(RenderExecutor::new(oracle).with_observer(Arc::new(relay)));
        let engine = Arc::new(AutoFitEngine::new(settings.fit.clone()));
        let printed = Arc::new(Mutex::new(None));

        let render = RenderContext::new(
            render_port,
            RenderHandshake::new(settings.ready_interval),
            Arc::clone(&store),
            queue,
            Arc::clone(&executor),
            engine,
            Arc::clone(&printed),
        );
        let (host_context, host) = HostContext::new(host_port);

        let tasks = vec![tokio::spawn(render.run()), tokio::spawn(host_context.run())];
        info!("Session started");

        Self {
            host,
            store,
            executor,
            printed,
            tasks,
        }
    }

    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn executor(&self) -> &Arc<RenderExecutor<O>> {
        &self.executor
    }

    /// Output of the most recent `PRINT`, if one has completed.
    pub fn printed(&self) -> Option<String> {
        self.printed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl<O: PaginationOracle> Drop for Session<O> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// One harness request: content, an optional style batch, and whether to auto-fit.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub markdown: String,
    pub styles: Option<StyleSnapshot>,
    pub view_options: BTreeMap<String, String>,
    pub auto_fit: bool,
}

/// Runs `job` through a fresh session and waits for its render-complete signal.
pub async fn run_render_job<O: PaginationOracle>(
    oracle: O,
    settings: &SessionSettings,
    job: RenderJob,
) -> Result<RenderReport, SessionError> {
    let session = Session::start(oracle, settings);
    let host = session.host();

    host.set_content(job.markdown)?;
    if let Some(styles) = job.styles {
        host.update_styles(styles)?;
    }
    for (name, value) in job.view_options {
        host.set_view_option(name, value)?;
    }
    if job.auto_fit {
        host.fit_to_page()?;
    }

    host.wait_ready(settings.handshake_timeout).await?;
    let completion = host.wait_render_complete(settings.render_timeout).await?;

    let measurement = completion.measurement.ok_or_else(|| {
        SessionError::Render(
            completion
                .last_error
                .clone()
                .unwrap_or_else(|| "no measurement produced".to_string()),
        )
    })?;
    let stats = session
        .executor()
        .baseline()
        .map(|b| b.markup.stats())
        .unwrap_or_default();

    Ok(RenderReport::build(
        &measurement,
        stats,
        completion.fit,
        session.store().snapshot().styles,
        settings.fit.sparsity_threshold,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autofit::{Direction, Termination};
    use crate::layout::font_metrics::FontFamily;
    use crate::layout::metric_oracle::MetricOracle;
    use crate::render::report::ReportStatus;
    use crate::store::RenderPhase;

    fn fast_settings() -> SessionSettings {
        SessionSettings {
            ready_interval: Duration::from_millis(10),
            queue: QueueSettings {
                debounce: Duration::from_millis(20),
                dedup_window: Duration::from_millis(1000),
            },
            ..SessionSettings::default()
        }
    }

    fn paragraphs(n: usize) -> String {
        (0..n)
            .map(|i| format!("Delivered project {i} ahead of schedule.\n\n"))
            .collect()
    }

    #[tokio::test]
    async fn test_plain_render_completes_without_auto_fit() {
        let report = run_render_job(
            MetricOracle::new(FontFamily::Inter),
            &fast_settings(),
            RenderJob {
                markdown: paragraphs(20),
                styles: None,
                view_options: BTreeMap::new(),
                auto_fit: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(report.status, ReportStatus::Success);
        assert_eq!(report.current_pages, 1);
        assert!(!report.auto_fit_status.run);
        assert_eq!(report.content_stats.p_count, 20);
    }

    #[tokio::test]
    async fn test_overflowing_content_is_shrunk_to_one_page() {
        let report = run_render_job(
            MetricOracle::new(FontFamily::Inter),
            &fast_settings(),
            RenderJob {
                markdown: paragraphs(38),
                styles: None,
                view_options: BTreeMap::new(),
                auto_fit: true,
            },
        )
        .await
        .unwrap();

        let fit = report.auto_fit_status.result.clone().unwrap();
        assert_eq!(fit.direction, Direction::Shrink);
        assert!(fit.success);
        assert_eq!(report.current_pages, 1);
        assert_eq!(report.status, ReportStatus::Success);
        assert_ne!(report.styles["--page-margin"], "12mm");
    }

    #[tokio::test]
    async fn test_sparse_content_is_expanded() {
        let report = run_render_job(
            MetricOracle::new(FontFamily::Inter),
            &fast_settings(),
            RenderJob {
                markdown: paragraphs(12),
                styles: None,
                view_options: BTreeMap::new(),
                auto_fit: true,
            },
        )
        .await
        .unwrap();

        let fit = report.auto_fit_status.result.unwrap();
        assert_eq!(fit.direction, Direction::Expand);
        assert!(fit.success);
        assert_eq!(report.current_pages, 1);
        assert_eq!(report.styles["--body-font-size"], fit.styles["--body-font-size"]);
    }

    #[tokio::test]
    async fn test_user_styles_seed_the_search() {
        let mut styles = StyleSnapshot::new();
        styles.insert("--page-margin".to_string(), "7mm".to_string());
        styles.insert("--line-height".to_string(), "1.2".to_string());
        let report = run_render_job(
            MetricOracle::new(FontFamily::Inter),
            &fast_settings(),
            RenderJob {
                markdown: paragraphs(30),
                styles: Some(styles),
                view_options: BTreeMap::new(),
                auto_fit: true,
            },
        )
        .await
        .unwrap();

        let fit = report.auto_fit_status.result.unwrap();
        // tight user styles already hold 30 paragraphs on one page
        assert_ne!(fit.direction, Direction::Shrink);
        assert_ne!(fit.termination, Termination::RenderFailed);
        assert_eq!(report.current_pages, 1);
    }

    #[tokio::test]
    async fn test_session_store_tracks_render_status() {
        let settings = fast_settings();
        let session = Session::start(MetricOracle::new(FontFamily::Inter), &settings);
        let host = session.host();
        host.set_content("# Title\n\nBody").unwrap();
        host.wait_ready(settings.handshake_timeout).await.unwrap();
        let completion = host
            .wait_render_complete(settings.render_timeout)
            .await
            .unwrap();

        assert_eq!(completion.measurement.map(|m| m.page_count), Some(1));
        let state = session.store().snapshot();
        assert_eq!(state.render.phase, RenderPhase::Rendered);
        assert_eq!(state.content_revision, 1);
        assert!(host.status().last_measurement.is_some());
    }

    #[tokio::test]
    async fn test_back_to_back_fit_requests_both_complete() {
        let settings = fast_settings();
        let session = Session::start(MetricOracle::new(FontFamily::Inter), &settings);
        let host = session.host();
        host.set_content(paragraphs(38)).unwrap();
        host.fit_to_page().unwrap();
        host.fit_to_page().unwrap();
        host.wait_ready(settings.handshake_timeout).await.unwrap();

        let completion = host
            .wait_render_complete(settings.render_timeout)
            .await
            .unwrap();
        assert_eq!(completion.fits_completed, 2);
        assert!(completion.fit.unwrap().success);
        assert!(!session.store().snapshot().ui.auto_fitting);
    }

    #[tokio::test]
    async fn test_print_stores_printable_output() {
        let settings = fast_settings();
        let session = Session::start(MetricOracle::new(FontFamily::Inter), &settings);
        let host = session.host();
        host.set_content("# Printable").unwrap();
        host.wait_ready(settings.handshake_timeout).await.unwrap();
        host.wait_render_complete(settings.render_timeout)
            .await
            .unwrap();
        host.print().unwrap();

        let mut printed = None;
        for _ in 0..100 {
            printed = session.printed();
            if printed.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let html = printed.unwrap();
        assert!(html.contains("<h1>Printable</h1>"));
        assert!(html.contains("@page { size: A4; margin: 0; }"));
    }

    #[tokio::test]
    async fn test_handshake_timeout_when_render_context_absent() {
        let (host_port, _render_port) = duplex();
        let (context, handle) = HostContext::new(host_port);
        tokio::spawn(context.run());
        let err = handle
            .wait_ready(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::HandshakeTimeout(_)));
    }
}
