//! Render task queue: collapses bursts of render-worthy actions into one pass.
//!
//! Middleware tags actions that should render; a store subscriber turns each
//! tagged action into a `RenderTask`. A task whose reason already sits unexpired in
//! the queue is dropped. Every accepted task restarts the debounce deadline; once
//! it passes, the whole queue is handed over as one merged request and cleared.

pub mod clock;
pub mod task;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::store::{Action, Dispatch, Middleware, Store, StoreState, Topic};

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use task::{RenderReason, RenderTask, TaskPayload};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueSettings {
    pub debounce: Duration,
    pub dedup_window: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued { id: u64 },
    Deduplicated { existing: u64 },
}

/// Every task drained in one debounce cycle, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTasks {
    pub tasks: Vec<RenderTask>,
}

impl MergedTasks {
    /// Distinct reasons, highest priority first.
    pub fn reasons(&self) -> Vec<RenderReason> {
        let mut reasons: Vec<RenderReason> = self.tasks.iter().map(|t| t.reason).collect();
        reasons.sort_by_key(|r| r.priority());
        reasons.dedup();
        reasons
    }
}

pub struct RenderTaskQueue {
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    tasks: Vec<RenderTask>,
    deadline: Option<Duration>,
    next_id: u64,
}

pub type SharedQueue = Arc<Mutex<RenderTaskQueue>>;

impl RenderTaskQueue {
    pub fn new(clock: Arc<dyn Clock>, settings: QueueSettings) -> Self {
        Self {
            clock,
            settings,
            tasks: Vec::new(),
            deadline: None,
            next_id: 0,
        }
    }

    pub fn shared(clock: Arc<dyn Clock>, settings: QueueSettings) -> SharedQueue {
        Arc::new(Mutex::new(Self::new(clock, settings)))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[RenderTask] {
        &self.tasks
    }

    pub fn enqueue(&mut self, reason: RenderReason, payload: TaskPayload) -> EnqueueOutcome {
        let now = self.clock.now();
        if let Some(existing) = self
            .tasks
            .iter()
            .find(|t| t.dedup_key() == reason && !t.is_expired(now, self.settings.dedup_window))
        {
            debug!(?reason, existing = existing.id, "render task deduplicated");
            return EnqueueOutcome::Deduplicated {
                existing: existing.id,
            };
        }

        self.next_id += 1;
        let task = RenderTask {
            id: self.next_id,
            reason,
            created_at: now,
            priority: reason.priority(),
            payload,
        };
        // Stable insert: after every task of equal or higher priority.
        let at = self
            .tasks
            .iter()
            .position(|t| t.priority > task.priority)
            .unwrap_or(self.tasks.len());
        self.tasks.insert(at, task);

        self.deadline = Some(now + self.settings.debounce);
        debug!(?reason, id = self.next_id, queued = self.tasks.len(), "render task queued");
        EnqueueOutcome::Queued { id: self.next_id }
    }

    /// Clock reading at which the queue becomes due, if anything is queued.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn time_until_due(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_sub(self.clock.now()))
    }

    /// Drains the queue if the debounce deadline has passed.
    pub fn take_due(&mut self) -> Option<MergedTasks> {
        match self.deadline {
            Some(deadline) if self.clock.now() >= deadline => self.flush(),
            _ => None,
        }
    }

    /// Drains the queue immediately, ignoring the debounce deadline.
    pub fn flush(&mut self) -> Option<MergedTasks> {
        self.deadline = None;
        if self.tasks.is_empty() {
            return None;
        }
        Some(MergedTasks {
            tasks: std::mem::take(&mut self.tasks),
        })
    }
}

/// Tags render-worthy actions with their `RenderReason`.
pub struct RenderTriggerMiddleware;

impl Middleware for RenderTriggerMiddleware {
    fn intercept(&self, mut dispatch: Dispatch, _state: &StoreState) -> Dispatch {
        dispatch.render_reason = match &dispatch.action {
            Action::ContentLoaded { .. } => Some(RenderReason::ContentChanged),
            Action::StylesUpdated { .. } => Some(RenderReason::StyleBatch),
            Action::ViewOptionChanged { .. } => Some(RenderReason::UiChanged),
            _ => dispatch.render_reason,
        };
        dispatch
    }
}

/// Wires `queue` to `store`: installs the trigger middleware and a subscriber
/// that enqueues a task for every tagged action.
pub fn attach(queue: &SharedQueue, store: &Store) {
    store.add_middleware(Arc::new(RenderTriggerMiddleware));

    let queue = Arc::clone(queue);
    store.subscribe(
        &[Topic::Content, Topic::Styles, Topic::Ui],
        move |dispatch, _old, new| {
            let Some(reason) = dispatch.render_reason else {
                return Ok(());
            };
            let payload = match &dispatch.action {
                Action::ContentLoaded { .. } => TaskPayload::Content {
                    revision: new.content_revision,
                },
                Action::StylesUpdated { styles } => TaskPayload::Styles(styles.clone()),
                Action::ViewOptionChanged { name, value } => TaskPayload::View {
                    name: name.clone(),
                    value: value.clone(),
                },
                other => anyhow::bail!("{} cannot carry a render task", other.name()),
            };
            lock_queue(&queue).enqueue(reason, payload);
            Ok(())
        },
    );
}

pub fn lock_queue(queue: &SharedQueue) -> MutexGuard<'_, RenderTaskQueue> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StyleSnapshot;

    fn make_queue() -> (Arc<ManualClock>, RenderTaskQueue) {
        let clock = Arc::new(ManualClock::new());
        let queue = RenderTaskQueue::new(clock.clone(), QueueSettings::default());
        (clock, queue)
    }

    fn styles(margin: &str) -> TaskPayload {
        let mut s = StyleSnapshot::new();
        s.insert("--page-margin".to_string(), margin.to_string());
        TaskPayload::Styles(s)
    }

    #[test]
    fn test_rapid_style_batches_collapse_into_one_task() {
        let (clock, mut queue) = make_queue();
        assert_eq!(
            queue.enqueue(RenderReason::StyleBatch, styles("10mm")),
            EnqueueOutcome::Queued { id: 1 }
        );
        for margin in ["11mm", "12mm", "13mm", "14mm"] {
            clock.advance(Duration::from_millis(100));
            assert_eq!(
                queue.enqueue(RenderReason::StyleBatch, styles(margin)),
                EnqueueOutcome::Deduplicated { existing: 1 }
            );
        }
        // 400ms after the first, still inside the 1000ms window
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_expired_task_no_longer_dedups() {
        let (clock, mut queue) = make_queue();
        queue.enqueue(RenderReason::StyleBatch, styles("10mm"));
        clock.advance(Duration::from_millis(1000));
        assert_eq!(
            queue.enqueue(RenderReason::StyleBatch, styles("11mm")),
            EnqueueOutcome::Queued { id: 2 }
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_priority_order_content_first() {
        let (_clock, mut queue) = make_queue();
        queue.enqueue(
            RenderReason::UiChanged,
            TaskPayload::View {
                name: "zoom".to_string(),
                value: "1.2".to_string(),
            },
        );
        queue.enqueue(RenderReason::StyleBatch, styles("10mm"));
        queue.enqueue(RenderReason::ContentChanged, TaskPayload::Content { revision: 1 });

        let order: Vec<RenderReason> = queue.tasks().iter().map(|t| t.reason).collect();
        assert_eq!(
            order,
            vec![
                RenderReason::ContentChanged,
                RenderReason::StyleBatch,
                RenderReason::UiChanged
            ]
        );
    }

    #[test]
    fn test_debounce_restarts_on_each_accepted_task() {
        let (clock, mut queue) = make_queue();
        queue.enqueue(RenderReason::StyleBatch, styles("10mm"));
        clock.advance(Duration::from_millis(200));
        queue.enqueue(RenderReason::ContentChanged, TaskPayload::Content { revision: 1 });
        assert_eq!(queue.deadline(), Some(Duration::from_millis(500)));

        clock.advance(Duration::from_millis(200));
        assert!(queue.take_due().is_none(), "deadline was restarted");

        clock.advance(Duration::from_millis(100));
        let merged = queue.take_due().expect("due after 300ms of quiet");
        assert_eq!(merged.tasks.len(), 2);
        assert_eq!(
            merged.reasons(),
            vec![RenderReason::ContentChanged, RenderReason::StyleBatch]
        );
        assert!(queue.is_empty());
        assert_eq!(queue.deadline(), None);
    }

    #[test]
    fn test_dedup_does_not_restart_debounce() {
        let (clock, mut queue) = make_queue();
        queue.enqueue(RenderReason::StyleBatch, styles("10mm"));
        clock.advance(Duration::from_millis(200));
        queue.enqueue(RenderReason::StyleBatch, styles("11mm"));
        assert_eq!(queue.deadline(), Some(Duration::from_millis(300)));
        assert_eq!(queue.time_until_due(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_flush_ignores_deadline() {
        let (_clock, mut queue) = make_queue();
        assert!(queue.flush().is_none());
        queue.enqueue(RenderReason::StyleBatch, styles("10mm"));
        assert_eq!(queue.flush().map(|m| m.tasks.len()), Some(1));
        assert!(queue.flush().is_none());
    }

    #[test]
    fn test_attach_enqueues_from_store() {
        let clock = Arc::new(ManualClock::new());
        let queue = RenderTaskQueue::shared(clock.clone(), QueueSettings::default());
        let store = Store::new();
        attach(&queue, &store);

        store.dispatch(Action::ContentLoaded {
            markdown: "# CV".to_string(),
        });
        let mut batch = StyleSnapshot::new();
        batch.insert("--line-height".to_string(), "1.4".to_string());
        store.dispatch(Action::StylesUpdated {
            styles: batch.clone(),
        });
        store.dispatch(Action::StylesUpdated { styles: batch });
        store.dispatch(Action::FitStepApplied {
            variable: "--page-margin".to_string(),
            value: "8mm".to_string(),
        });
        store.dispatch(Action::RenderStarted);

        let q = lock_queue(&queue);
        assert_eq!(q.len(), 2);
        assert_eq!(q.tasks()[0].payload, TaskPayload::Content { revision: 1 });
        assert_eq!(q.tasks()[1].reason, RenderReason::StyleBatch);
    }
}
