use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::StyleSnapshot;

/// Why a render was requested. Doubles as the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderReason {
    ContentChanged,
    StyleBatch,
    UiChanged,
}

impl RenderReason {
    /// Static reason → priority table. Lower runs sooner.
    pub const fn priority(self) -> u8 {
        match self {
            RenderReason::ContentChanged => 0,
            RenderReason::StyleBatch => 10,
            RenderReason::UiChanged => 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    Content { revision: u64 },
    Styles(StyleSnapshot),
    View { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTask {
    pub id: u64,
    pub reason: RenderReason,
    /// Clock reading at creation.
    pub created_at: Duration,
    pub priority: u8,
    pub payload: TaskPayload,
}

impl RenderTask {
    pub fn dedup_key(&self) -> RenderReason {
        self.reason
    }

    pub fn is_expired(&self, now: Duration, window: Duration) -> bool {
        now.saturating_sub(self.created_at) >= window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_table_order() {
        assert!(RenderReason::ContentChanged.priority() < RenderReason::StyleBatch.priority());
        assert!(RenderReason::StyleBatch.priority() < RenderReason::UiChanged.priority());
    }

    #[test]
    fn test_expiry_uses_window() {
        let task = RenderTask {
            id: 1,
            reason: RenderReason::StyleBatch,
            created_at: Duration::from_millis(100),
            priority: RenderReason::StyleBatch.priority(),
            payload: TaskPayload::Styles(StyleSnapshot::new()),
        };
        let window = Duration::from_millis(1000);
        assert!(!task.is_expired(Duration::from_millis(1099), window));
        assert!(task.is_expired(Duration::from_millis(1100), window));
    }
}
