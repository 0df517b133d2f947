//! Gator: a command-line RSS aggregator.
//!
//! Users register feeds; the aggregation loop repeatedly claims the
//! least-recently-fetched feed, downloads it and stores new posts.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
pub mod util;
