//! Feed retrieval: HTTP download, RSS decoding and timestamp parsing.
//!
//! - [`fetcher`] - one bounded GET per feed with size and deadline limits
//! - [`parser`] - decoding the RSS `channel`/`item` structure
//! - [`time`] - tolerant multi-layout `pubDate` parsing

mod fetcher;
mod parser;
mod time;

pub use fetcher::{FetchError, Fetcher, DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT};
pub use parser::{parse_document, ParseError, RawChannel, RawFeedDocument, RawItem};
pub use time::{parse_timestamp, Layout, TimeParseError, LAYOUTS};
