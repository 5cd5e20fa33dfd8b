//! # Interface Layer
//!
//! User-facing command handlers, invoked by the cogs.

pub mod commands;
