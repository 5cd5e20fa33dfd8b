//! # Help Command
//!
//! Handles the `.help` command.
//! Displays the main help menu to the user.

use crate::domain::traits::ChatProvider;
use anyhow::Result;

pub async fn handle_help(chat: &dyn ChatProvider, room_id: &str, prefix: &str) -> Result<()> {
    chat.send_message(room_id, &crate::strings::help::main(prefix))
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!(e))
}
