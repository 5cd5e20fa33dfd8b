//! # Command Router
//!
//! Loads the configured cogs and routes chat events to them.
//! Commands (`.name args`) go to the cog that owns `name`; every other message is
//! offered to each cog in load order.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::application::context::BotContext;
use crate::application::session::EventHandler;
use crate::domain::error::BotError;
use crate::domain::types::{ChatEvent, ChatMessage};
use crate::interface::commands;
use crate::strings::{logs, messages};

/// A pluggable feature module.
#[async_trait]
pub trait Cog: Send + Sync {
    fn name(&self) -> &'static str;

    /// Command names this cog answers to, without prefix.
    fn commands(&self) -> &'static [&'static str];

    async fn on_ready(&self, _ctx: &BotContext) -> Result<()> {
        Ok(())
    }

    async fn on_command(&self, ctx: &BotContext, msg: &ChatMessage, cmd: &str, args: &str) -> Result<()>;

    /// Any non-command message.
    async fn on_message(&self, _ctx: &BotContext, _msg: &ChatMessage) -> Result<()> {
        Ok(())
    }
}

/// Always loaded: help.
pub struct CoreCog;

#[async_trait]
impl Cog for CoreCog {
    fn name(&self) -> &'static str {
        "core"
    }

    fn commands(&self) -> &'static [&'static str] {
        &["help"]
    }

    async fn on_command(&self, ctx: &BotContext, msg: &ChatMessage, _cmd: &str, _args: &str) -> Result<()> {
        commands::help::handle_help(ctx.chat.as_ref(), &msg.room_id, &ctx.config.system.command_prefix).await
    }
}

/// Project registration wizards.
pub struct ProjectsCog;

#[async_trait]
impl Cog for ProjectsCog {
    fn name(&self) -> &'static str {
        "projects"
    }

    fn commands(&self) -> &'static [&'static str] {
        &["project"]
    }

    async fn on_command(&self, ctx: &BotContext, msg: &ChatMessage, _cmd: &str, args: &str) -> Result<()> {
        commands::project::handle_project(ctx, msg, args).await
    }

    async fn on_message(&self, ctx: &BotContext, msg: &ChatMessage) -> Result<()> {
        commands::wizard::handle_answer(ctx, msg).await
    }
}

/// Resolves an extension name to its cog.
fn load_extension(name: &str) -> Option<Arc<dyn Cog>> {
    match name {
        "projects" => Some(Arc::new(ProjectsCog)),
        _ => None,
    }
}

pub struct CommandRouter {
    ctx: Arc<BotContext>,
    cogs: Vec<Arc<dyn Cog>>,
}

impl CommandRouter {
    /// Loads the core cog plus every named extension.
    pub fn load(ctx: Arc<BotContext>, extensions: &[String]) -> Result<Self, BotError> {
        let mut cogs: Vec<Arc<dyn Cog>> = vec![Arc::new(CoreCog)];
        for name in extensions {
            tracing::debug!("{}", logs::extension_loading(name));
            match load_extension(name) {
                Some(cog) => cogs.push(cog),
                None => {
                    tracing::error!("{}", logs::extension_failed(name));
                    return Err(BotError::ExtensionLoad(name.clone()));
                }
            }
        }
        Ok(Self { ctx, cogs })
    }

    #[cfg(test)]
    fn cog_names(&self) -> Vec<&'static str> {
        self.cogs.iter().map(|c| c.name()).collect()
    }

    pub async fn route(&self, msg: &ChatMessage) -> Result<()> {
        let body = msg.body.trim();
        let prefix = self.ctx.config.system.command_prefix.as_str();

        let Some(command) = body.strip_prefix(prefix).filter(|c| !c.is_empty()) else {
            for cog in &self.cogs {
                if let Err(e) = cog.on_message(&self.ctx, msg).await {
                    tracing::error!("Cog '{}' failed on message: {:#}", cog.name(), e);
                }
            }
            return Ok(());
        };

        let (cmd, args) = match command.find(char::is_whitespace) {
            Some(idx) => (&command[..idx], command[idx..].trim()),
            None => (command, ""),
        };
        tracing::info!(
            "Router dispatching cmd='{}' args='{}' sender='{}'",
            cmd,
            args,
            msg.sender
        );

        match self.cogs.iter().find(|c| c.commands().iter().any(|name| *name == cmd)) {
            Some(cog) => cog.on_command(&self.ctx, msg, cmd, args).await,
            None => {
                self.ctx
                    .chat
                    .send_message(&msg.room_id, &messages::unknown_command(prefix))
                    .await
                    .map_err(|e| anyhow::anyhow!(e))?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl EventHandler for CommandRouter {
    async fn handle(&self, event: ChatEvent) {
        match event {
            ChatEvent::Ready => {
                for cog in &self.cogs {
                    if let Err(e) = cog.on_ready(&self.ctx).await {
                        tracing::error!("Cog '{}' failed on ready: {:#}", cog.name(), e);
                    }
                }
            }
            ChatEvent::MessageCreated(msg) => {
                if let Err(e) = self.route(&msg).await {
                    tracing::error!("Failed to route message: {:#}", e);
                    let _ = self
                        .ctx
                        .chat
                        .send_message(&msg.room_id, &messages::command_failed(&format!("{e:#}")))
                        .await;
                }
            }
            ChatEvent::MessageEdited { original_event_id, message } => {
                tracing::debug!("Message {} edited by {}", original_event_id, message.sender);
            }
            ChatEvent::MessageDeleted { room_id, event_id } => {
                tracing::debug!("Message {} deleted in {}", event_id, room_id);
            }
            ChatEvent::Disconnected { .. } => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::context::tests::test_config;
    use crate::application::state::RuntimeState;
    use crate::application::wizard_manager::tests::RecordingChat;
    use chrono::Utc;

    fn setup() -> (Arc<BotContext>, Arc<RecordingChat>) {
        let chat = Arc::new(RecordingChat::default());
        let ctx = Arc::new(BotContext::init(test_config(), chat.clone(), RuntimeState::in_memory()));
        (ctx, chat)
    }

    pub(crate) fn message(sender: &str, room: &str, body: &str) -> ChatMessage {
        ChatMessage {
            event_id: "$1".to_string(),
            room_id: room.to_string(),
            sender: sender.to_string(),
            body: body.to_string(),
            timestamp: Utc::now(),
            is_direct: true,
        }
    }

    #[test]
    fn test_unknown_extension_fails_to_load() {
        let (ctx, _) = setup();
        let err = CommandRouter::load(ctx, &["projects".to_string(), "badges".to_string()])
            .err()
            .unwrap();
        assert!(matches!(err, BotError::ExtensionLoad(ref name) if name == "badges"));
    }

    #[test]
    fn test_core_always_loaded() {
        let (ctx, _) = setup();
        let router = CommandRouter::load(ctx, &["projects".to_string()]).unwrap();
        assert_eq!(router.cog_names(), vec!["core", "projects"]);
    }

    #[tokio::test]
    async fn test_help_and_unknown_command() {
        let (ctx, chat) = setup();
        let router = CommandRouter::load(ctx, &[]).unwrap();

        router.handle(ChatEvent::MessageCreated(message("@u:x", "!room", ".help"))).await;
        router.handle(ChatEvent::MessageCreated(message("@u:x", "!room", ".dance now"))).await;
        router.handle(ChatEvent::MessageCreated(message("@u:x", "!room", "just chatting"))).await;

        let msgs = chat.messages_to("!room");
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].contains("Cogwheel Help"));
        assert_eq!(msgs[1], messages::unknown_command("."));
    }

    #[tokio::test]
    async fn test_replies_quote_configured_prefix() {
        let mut config = test_config();
        config.system.command_prefix = "!".to_string();
        let chat = Arc::new(RecordingChat::default());
        let ctx = Arc::new(BotContext::init(config, chat.clone(), RuntimeState::in_memory()));
        let router = CommandRouter::load(ctx.clone(), &["projects".to_string()]).unwrap();

        router.handle(ChatEvent::MessageCreated(message("@u:x", "!room", "!dance"))).await;
        router.handle(ChatEvent::MessageCreated(message("@u:x", "!room", "!project new"))).await;

        assert_eq!(chat.messages_to("!room"), vec![messages::unknown_command("!")]);
        let dm = chat.messages_to("@u:x");
        assert!(dm[0].contains("`!project cancel`"));
        assert!(!dm[0].contains(".project"));
    }
}

