//! # Log Strings
//!
//! Log lines shared by the supervisor, the session and the wizard system.

pub const CONFIG_PARSE_ERROR: &str = "Failed to parse YAML";

pub fn welcome(version: &str) -> String {
    format!("Welcome to Cogwheel v{version}, booting up...")
}

pub const BOT_HALTED: &str = "Bot halted unexpectedly.";
pub const RETRY_LIMIT: &str = "Too many failed attempts. Exiting.";
pub const INTERRUPTED: &str = "Interrupted by user. Exiting.";
pub const RESTARTING: &str = "Restarting bot...";
pub const BACKOFF_RESET: &str = "Connection stable, backoff reset.";
pub const EXITING: &str = "Exiting.";

pub fn restarting_in(secs: f64) -> String {
    format!("Restarting bot in {secs:.1} seconds...")
}

pub const SESSION_CONNECTING: &str = "Connecting to chat service...";
pub const SESSION_READY: &str = "Chat service ready.";
pub const SESSION_INTERRUPTED: &str = "Interrupted by user";
pub const SESSION_CLOSING: &str = "Waiting for client to close...";
pub const SESSION_CLOSED: &str = "Client closed.";
pub const SESSION_CANCELLING: &str = "Cancelling pending tasks...";

pub fn session_fault(err: &str) -> String {
    format!("Uncaught exception during bot execution: {err}")
}

pub fn session_disconnected(reason: &str) -> String {
    format!("Disconnected from chat service: {reason}")
}

pub fn cancel_timeout(pending: usize) -> String {
    format!("Timed out cancelling {pending} pending task(s)")
}

pub fn task_detached(id: &str) -> String {
    format!("Task {id} did not stop in time and was detached")
}

pub const SHUTDOWN: &str = "Shutting down...";

pub fn shutdown_fail(err: &str) -> String {
    format!("Unable to listen for shutdown signal: {err}")
}

pub fn extension_loading(name: &str) -> String {
    format!("Loading extension: {name}")
}

pub fn extension_failed(name: &str) -> String {
    format!("Failed to load extension {name}")
}

pub fn wizard_started(kind: &str, user: &str) -> String {
    format!("Starting '{kind}' wizard for {user}")
}

pub fn wizard_start_failed(kind: &str, user: &str, err: &str) -> String {
    format!("Could not start '{kind}' wizard for {user}, removed: {err}")
}

pub fn wizard_answer(kind: &str, user: &str) -> String {
    format!("Processing '{kind}' wizard answer for {user}")
}

pub fn wizard_closed(kind: &str, user: &str) -> String {
    format!("Closing '{kind}' wizard for {user}")
}

pub fn wizard_cancelled(kind: &str, user: &str) -> String {
    format!("Cancelled '{kind}' project wizard for user {user}")
}

pub fn wizard_dropped(kind: &str, user: &str, reason: &str) -> String {
    format!("Dropping saved '{kind}' wizard for {user}: {reason}")
}

pub fn state_write_failed(err: &str) -> String {
    format!("Failed to write runtime state: {err}")
}
