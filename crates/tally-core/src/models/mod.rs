//! Data models shared across the pipeline.

pub mod config;
pub mod entry;

pub use config::TallyConfig;
pub use entry::{Amount, Entry, Posting};
