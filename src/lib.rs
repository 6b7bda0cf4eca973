//! Visitor-side client for a website support-chat inbox.

pub mod api;
pub mod client;
pub mod config;
pub mod log;
pub mod render;
pub mod store;
pub mod types;
