//! Per-credential usage accounting

mod collector;

pub use collector::{KeyUsage, UsageCollector, UsageSnapshot};
