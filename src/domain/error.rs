//! # Error Taxonomy
//!
//! Typed errors for the supervisor and the wizard system. Application plumbing wraps
//! these in `anyhow` where the caller only needs to log.

use thiserror::Error;

/// Lifecycle errors of the bot runtime.
#[derive(Debug, Error)]
pub enum BotError {
    /// Backoff ceiling reached; terminates the supervisor.
    #[error("maximum retry attempts exceeded ({max_attempts})")]
    RetryLimitExceeded { max_attempts: u32 },

    /// Recoverable failure inside a connection session.
    #[error("session fault: {0}")]
    SessionFault(String),

    #[error("interrupted by user")]
    UserInterrupt,

    #[error("failed to load extension '{0}'")]
    ExtensionLoad(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised by the wizard engine and the wizard manager.
/// None of these are fatal; they are relayed to the user or logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("You already have an ongoing wizard!")]
    AlreadyOpen,

    #[error("You don't have an active wizard.")]
    NoActiveWizard,

    #[error("The wizard is not finished yet.")]
    NotDone,

    #[error("The wizard has no more questions.")]
    Done,

    /// Per-field rejection; the message is shown to the user as-is.
    #[error("{0}")]
    Validation(String),

    /// A persisted answer no longer validates.
    #[error("cannot restore wizard: answer for '{key}' is invalid: {reason}")]
    Restore { key: String, reason: String },

    #[error("failed to send wizard message: {0}")]
    Send(String),
}
