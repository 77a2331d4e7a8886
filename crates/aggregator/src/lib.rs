pub mod accumulator;
pub mod aggregator;
pub mod bucket;
pub mod registry;
