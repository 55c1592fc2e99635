pub mod funnel;
pub mod stats;
