//! # Strings Module
//!
//! Centralizes user-facing strings, log lines and help text.
//! Ensures consistency in messaging and easier localization/updates.

pub mod help;
pub mod logs;
pub mod messages;
pub mod wizard;
