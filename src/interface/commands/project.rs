//! # Project Command
//!
//! Handles `.project <new|wizard|edit|cancel|show>`.
//! Wizards talk to the user in a direct room; command feedback goes to the room the
//! command came from.

use anyhow::Result;

use crate::application::context::BotContext;
use crate::domain::error::WizardError;
use crate::domain::types::ChatMessage;
use crate::strings::messages;

async fn reply(ctx: &BotContext, msg: &ChatMessage, content: &str) -> Result<()> {
    ctx.chat
        .send_message(&msg.room_id, content)
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!(e))
}

pub async fn handle_project(ctx: &BotContext, msg: &ChatMessage, args: &str) -> Result<()> {
    let prefix = ctx.config.system.command_prefix.as_str();
    let (sub, rest) = match args.split_once(char::is_whitespace) {
        Some((sub, rest)) => (sub, rest.trim()),
        None => (args, ""),
    };

    match sub {
        "new" | "wizard" => handle_new(ctx, msg).await,
        "edit" => handle_edit(ctx, msg).await,
        "cancel" => handle_cancel(ctx, msg).await,
        "show" => handle_show(ctx, msg, rest).await,
        _ => reply(ctx, msg, &messages::project_usage(prefix)).await,
    }
}

async fn handle_new(ctx: &BotContext, msg: &ChatMessage) -> Result<()> {
    let has_project = ctx.projects.lock().await.get(&msg.sender).is_some();
    if has_project {
        return reply(ctx, msg, &messages::project_exists(&ctx.config.system.command_prefix)).await;
    }

    match ctx.wizards.create_new_wizard(&msg.sender, msg.timestamp).await {
        Ok(()) => {
            if !msg.is_direct {
                reply(ctx, msg, messages::WIZARD_STARTED).await?;
            }
            Ok(())
        }
        Err(e @ WizardError::AlreadyOpen) => reply(ctx, msg, &e.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

async fn handle_edit(ctx: &BotContext, msg: &ChatMessage) -> Result<()> {
    let title = ctx
        .projects
        .lock()
        .await
        .get(&msg.sender)
        .map(|p| p.title.clone());
    let Some(title) = title else {
        return reply(ctx, msg, &messages::no_project(&ctx.config.system.command_prefix)).await;
    };

    match ctx.wizards.create_edit_wizard(&msg.sender, msg.timestamp, &title).await {
        Ok(()) => {
            if !msg.is_direct {
                reply(ctx, msg, messages::WIZARD_STARTED).await?;
            }
            Ok(())
        }
        Err(e @ WizardError::AlreadyOpen) => reply(ctx, msg, &e.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

async fn handle_cancel(ctx: &BotContext, msg: &ChatMessage) -> Result<()> {
    if ctx.wizards.cancel_wizards(&msg.sender).await.is_none() {
        return reply(ctx, msg, messages::NO_WIZARD).await;
    }
    ctx.persist().await
}

async fn handle_show(ctx: &BotContext, msg: &ChatMessage, user: &str) -> Result<()> {
    let owner = if user.is_empty() { msg.sender.as_str() } else { user };
    let card = ctx.projects.lock().await.get(owner).map(|p| {
        let genre = match &p.subgenre {
            Some(sub) => format!("{} ({})", p.genre, sub),
            None => p.genre.clone(),
        };
        messages::project_card(&p.title, &p.owner, &genre, &p.kind, &p.pitch)
    });
    match card {
        Some(card) => reply(ctx, msg, &card).await,
        None => reply(ctx, msg, &messages::no_project(&ctx.config.system.command_prefix)).await,
    }
}
