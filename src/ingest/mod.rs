//! The aggregation loop.
//!
//! [`Scheduler`] picks the least-recently-fetched feed, stamps it and runs it
//! through fetch and [`ingest_document`]. [`TickDriver`] repeats that on a
//! fixed interval until told to stop.

mod driver;
mod pipeline;
mod scheduler;

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use driver::{CycleOutcome, DriverError, DriverState, TickDriver};
pub use pipeline::{ingest_document, IngestReport};
pub use scheduler::{CycleError, CycleSummary, Scheduler};

/// Source of "now" for claim stamps and post creation times.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}
