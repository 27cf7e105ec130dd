//! Threshold alerting: watch sets, the tick engine, reading staleness and
//! the messages sent to chats.

pub mod engine;
pub mod message;
pub mod staleness;
pub mod thresholds;
