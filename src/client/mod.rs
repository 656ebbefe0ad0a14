pub mod generator;
pub mod stats;

pub use generator::{LoadGenerator, RunReport};
pub use stats::{Statistics, StatisticsAggregator, StatsSummary};
