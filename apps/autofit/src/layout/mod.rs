// Layout model behind the metric oracle.
// Markdown is parsed once into blocks; pagination replays them against font metrics.
// CPU-bound pagination must run inside tokio::task::spawn_blocking.

pub mod font_metrics;
pub mod markup;
pub mod metric_oracle;

pub use font_metrics::{get_metrics, FontFamily, FontMetricTable};
pub use markup::{parse_markdown, ContentStats, Markup};
pub use metric_oracle::MetricOracle;
