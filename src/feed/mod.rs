//! Feed retrieval and entry identity.
//!
//! - [`parser`] - RSS/Atom parsing using the `feed-rs` crate
//! - [`fetcher`] - HTTP retrieval with timeouts and bounded parallelism
//! - [`identity`] - Stable dedup keys for entries
//!
//! # Example
//!
//! ```ignore
//! use feedcast::feed::{fetch_all, identify, FetchOptions};
//!
//! let outcomes = fetch_all(&client, &sources, 4, FetchOptions::default()).await;
//! for outcome in outcomes {
//!     for entry in outcome.result? {
//!         println!("{}", identify(&entry));
//!     }
//! }
//! ```

mod fetcher;
mod identity;
mod parser;

pub use fetcher::{fetch, fetch_all, FeedOutcome, FetchError, FetchFailed, FetchOptions};
pub use identity::{identify, EntryIdentity};
pub use parser::{parse_feed, Entry, ParseResult};
