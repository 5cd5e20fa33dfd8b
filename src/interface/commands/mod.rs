//! # Command Handlers
//!
//! Contains specific handler functions for each supported command (e.g., .project, .help).
//! These handlers are invoked by the cogs registered in the Router.

pub mod help;
pub mod project;
pub mod wizard;
