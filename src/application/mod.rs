//! # Application Layer
//!
//! Supervisor, sessions, wizards and the command router.
//! Everything here talks to the chat service through the domain traits only.

pub mod backoff;
pub mod context;
pub mod logging;
pub mod projects;
pub mod router;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod wizard;
pub mod wizard_manager;
