use crate::config::Config;
use crate::session::SessionSettings;

/// Shared application state injected into all route handlers via Axum extractors.
/// Each render request builds its own session; nothing here is mutable.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Config,
    pub settings: SessionSettings,
}
