//! Input validation for the command front end.
//!
//! - **URL validation**: feed URLs must be public http(s) sources
//! - **Intervals**: `1m`, `30s`, `1h30m` style tick durations
//!
//! ```
//! use gator::util::{parse_interval, validate_feed_url};
//! use std::time::Duration;
//!
//! assert_eq!(parse_interval("1m").unwrap(), Duration::from_secs(60));
//! assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
//! ```

mod interval;
mod url_validator;

pub use interval::{parse_interval, IntervalError};
pub use url_validator::{validate_feed_url, UrlValidationError};
