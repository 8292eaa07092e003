//! Tails an event-log export and forwards new records to a Loki-compatible
//! push endpoint.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod pipeline;
pub mod source;
pub mod storage;
