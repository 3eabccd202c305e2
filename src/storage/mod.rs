//! Durable run state.

mod history;

pub use history::{HistoryError, HistoryRecord, HistoryStore};
