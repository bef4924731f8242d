//! Render execution: the oracle boundary, the single-flight executor, and the
//! report handed back to the automation harness.

pub mod executor;
pub mod oracle;
pub mod report;

pub use executor::{
    RenderError, RenderEvent, RenderExecutor, RenderObserver, RenderRequest, RenderState,
    SubmitOutcome,
};
pub use oracle::{ContentBaseline, OracleError, PaginationOracle, PAGE_GEOMETRY_RULE};
pub use report::{generate_hint, RenderReport};
