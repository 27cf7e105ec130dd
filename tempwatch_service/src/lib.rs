//! Temperature threshold alerts for chats.
//!
//! Chats declare thresholds with `/set`; each chat's ticker polls a weather
//! source on a fixed interval and notifies the chat when the temperature
//! reaches an armed threshold. See `alert::engine` for the tick algorithm
//! and `monitor` for the per-chat lifecycle.

pub mod alert;
pub mod bot;
pub mod commands;
pub mod config;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod notify;
pub mod store;
