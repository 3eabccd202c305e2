//! feedcast: polls RSS/Atom feeds and relays entries it has not delivered
//! before to Telegram and/or a webhook.
//!
//! A run is a single batch pass driven by an external scheduler:
//! read config → fetch all feeds → compute delta → deliver → persist history.

pub mod config;
pub mod feed;
pub mod notify;
pub mod pipeline;
pub mod storage;
pub mod util;
