//! # Wizard Command Handler
//!
//! Feeds direct messages from users with an open wizard into the wizard manager,
//! and turns a finished wizard into a registered project.

use anyhow::Result;
use chrono::Utc;

use crate::application::context::BotContext;
use crate::application::wizard_manager::AnswerOutcome;
use crate::domain::error::WizardError;
use crate::domain::types::ChatMessage;
use crate::strings::{messages, wizard as text};

pub async fn handle_answer(ctx: &BotContext, msg: &ChatMessage) -> Result<()> {
    if !msg.is_direct || !ctx.wizards.has_open_wizard(&msg.sender).await {
        return Ok(());
    }
    let user = msg.sender.as_str();

    match ctx.wizards.process_answer(user, &msg.body).await {
        Ok(AnswerOutcome::Next(question)) => {
            ctx.chat
                .send_message(user, &question)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            Ok(())
        }
        // A finished wizard left open by an interrupted finish is completed now
        Ok(AnswerOutcome::Done) | Err(WizardError::Done) => finish_wizard(ctx, user).await,
        Err(WizardError::Validation(err)) => {
            ctx.chat
                .send_message(user, &text::invalid_answer(&err))
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            ctx.wizards.send_question(user).await?;
            Ok(())
        }
        // Cancelled between the check and the answer
        Err(WizardError::NoActiveWizard) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Moves a finished wizard into the project registry.
///
/// The registry lock is taken before the wizard is removed, and the project is applied
/// before anything else is awaited, so cancellation can't drop the answers.
async fn finish_wizard(ctx: &BotContext, user: &str) -> Result<()> {
    let mut projects = ctx.projects.lock().await;
    let (kind, _, result) = ctx
        .wizards
        .close_wizard(user, |kind, wizard| projects.apply(kind, wizard, Utc::now()))
        .await?;
    drop(projects);

    match result {
        Ok(project) => {
            tracing::info!("Saved project '{}' for {} ({})", project.title, user, kind.as_str());
        }
        Err(e) => {
            tracing::error!("Could not save project for {}: {}", user, e);
            let _ = ctx.chat.send_message(user, &messages::command_failed(&e)).await;
        }
    }
    ctx.persist().await
}
