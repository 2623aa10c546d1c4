//! Foundation module - Core utilities and types
//!
//! - Collections and id generation
//! - Logging utilities

pub mod collections;
pub mod logging;
