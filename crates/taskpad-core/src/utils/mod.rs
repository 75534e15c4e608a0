//! Utility functions for display formatting.

pub mod format;

pub use format::{format_date, format_remaining, truncate_string};
