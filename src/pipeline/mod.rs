//! The allocation pipeline: aggregation, index calculation, rounding and the
//! multi-year orchestration that ties them together.

pub mod aggregate;
pub mod cache;
pub mod index;
pub mod orchestrator;
pub mod rounding;

pub use aggregate::{default_aggregations, AggregationSpec};
pub use index::{default_index_pairs, IndexPair};
pub use orchestrator::{Orchestrator, PipelineConfig};
pub use rounding::RoundingPolicy;
