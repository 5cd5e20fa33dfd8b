//! # Messages
//!
//! Contains constant strings and format functions for user-facing messages.

pub fn unknown_command(prefix: &str) -> String {
    format!("❓ Unknown command. Try `{prefix}help`.")
}

pub fn project_usage(prefix: &str) -> String {
    format!("Usage: `{prefix}project <new|edit|cancel|show>`")
}

pub fn no_project(prefix: &str) -> String {
    format!("You don't have a registered project. Use `{prefix}project new` to add one.")
}

pub fn project_exists(prefix: &str) -> String {
    format!("You already have a registered project. Use `{prefix}project edit` to change it.")
}

pub const NO_WIZARD: &str = "You don't have an open wizard.";
pub const WIZARD_STARTED: &str = "I've sent you a direct message to set up your project.";

pub fn command_failed(err: &str) -> String {
    format!("❌ **Command Failed**: {err}")
}

pub fn project_card(title: &str, owner: &str, genre: &str, kind: &str, pitch: &str) -> String {
    format!("**{title}**\n_by {owner}_\n\n**Genre**: {genre}\n**Type**: {kind}\n\n{pitch}")
}
