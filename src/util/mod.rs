//! Utility functions shared by the feed and notification layers.
//!
//! - **URL validation**: feed and webhook URLs must be absolute http(s)
//! - **Text processing**: char-safe truncation and HTML-to-plain-text cleanup

mod text;
mod url_validator;

pub use text::{
    collapse_whitespace, strip_control_chars, strip_html_tags, summary_to_plain_text,
    truncate_chars,
};
pub use url_validator::{validate_url, UrlValidationError};
