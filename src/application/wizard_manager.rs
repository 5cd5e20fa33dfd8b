//! # Wizard Manager
//!
//! Owns every open wizard, keyed by user. A user has at most one wizard at a time,
//! of either kind. State changes are committed under the lock before any message is
//! sent, so a slow chat service never leaves the map half-updated.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::application::wizard::{Wizard, WizardRecord, WizardTemplate};
use crate::domain::error::WizardError;
use crate::domain::traits::ChatProvider;
use crate::domain::types::{UserId, WizardKind};
use crate::strings::{logs, wizard as text};

/// Result of feeding an answer to a wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The wizard moved on (or stayed); carries the question to ask next.
    Next(String),
    Done,
}

pub struct WizardManager<V> {
    template: Arc<WizardTemplate<V>>,
    chat: Arc<dyn ChatProvider>,
    /// Command prefix quoted in the start and end messages.
    prefix: String,
    wizards: Mutex<HashMap<UserId, (WizardKind, Wizard<V>)>>,
}

impl<V: Clone + fmt::Display + Send + Sync + 'static> WizardManager<V> {
    pub fn new(template: Arc<WizardTemplate<V>>, chat: Arc<dyn ChatProvider>, prefix: impl Into<String>) -> Self {
        Self {
            template,
            chat,
            prefix: prefix.into(),
            wizards: Mutex::new(HashMap::new()),
        }
    }

    pub async fn has_open_wizard(&self, user: &str) -> bool {
        self.wizards.lock().await.contains_key(user)
    }

    /// Snapshot of the user's wizard.
    pub async fn get_wizard_for(&self, user: &str) -> Result<(WizardKind, Wizard<V>), WizardError> {
        self.wizards
            .lock()
            .await
            .get(user)
            .map(|(kind, wizard)| (*kind, wizard.clone()))
            .ok_or(WizardError::NoActiveWizard)
    }

    pub async fn create_new_wizard(&self, user: &str, now: DateTime<Utc>) -> Result<(), WizardError> {
        let wizard = Wizard::new(self.template.clone(), user, now);
        self.open(user, WizardKind::New, wizard, text::start_new(&self.prefix))
            .await
    }

    /// Starts a wizard that re-asks every question about an existing record.
    pub async fn create_edit_wizard(
        &self,
        user: &str,
        now: DateTime<Utc>,
        existing_title: &str,
    ) -> Result<(), WizardError> {
        let wizard = Wizard::new_edit(self.template.clone(), user, now);
        let start = text::start_edit(&self.prefix, existing_title, self.template.skip_token());
        self.open(user, WizardKind::Edit, wizard, start).await
    }

    async fn open(
        &self,
        user: &str,
        kind: WizardKind,
        wizard: Wizard<V>,
        start_message: String,
    ) -> Result<(), WizardError> {
        let question = {
            let mut guard = self.wizards.lock().await;
            if guard.contains_key(user) {
                return Err(WizardError::AlreadyOpen);
            }
            let question = wizard.question()?;
            guard.insert(user.to_string(), (kind, wizard));
            question
        };
        tracing::info!("{}", logs::wizard_started(kind.as_str(), user));

        let sent = match self.chat.send_message(user, &start_message).await {
            Ok(_) => self.chat.send_message(user, &question).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            tracing::warn!("{}", logs::wizard_start_failed(kind.as_str(), user, &e));
            self.wizards.lock().await.remove(user);
            return Err(WizardError::Send(e));
        }
        Ok(())
    }

    /// Re-sends the current question to the user.
    pub async fn send_question(&self, user: &str) -> Result<(), WizardError> {
        let question = {
            let guard = self.wizards.lock().await;
            let (_, wizard) = guard.get(user).ok_or(WizardError::NoActiveWizard)?;
            wizard.question()?
        };
        self.chat
            .send_message(user, &question)
            .await
            .map(|_| ())
            .map_err(WizardError::Send)
    }

    /// Feeds `text` to the user's wizard. Validation errors leave it on the same question.
    pub async fn process_answer(&self, user: &str, text: &str) -> Result<AnswerOutcome, WizardError> {
        let mut guard = self.wizards.lock().await;
        let (kind, wizard) = guard.get_mut(user).ok_or(WizardError::NoActiveWizard)?;
        tracing::info!("{}", logs::wizard_answer(kind.as_str(), user));
        tracing::debug!("Answer text: {:?}", text);

        wizard.answer(text)?;
        if wizard.is_done() {
            Ok(AnswerOutcome::Done)
        } else {
            Ok(AnswerOutcome::Next(wizard.question()?))
        }
    }

    /// Removes a finished wizard, sends the completion message and hands the wizard back.
    ///
    /// `commit` receives the wizard right after removal, before anything is awaited, so
    /// the result is stored even if the caller is cancelled during the send.
    pub async fn close_wizard<R>(
        &self,
        user: &str,
        commit: impl FnOnce(WizardKind, &Wizard<V>) -> R,
    ) -> Result<(WizardKind, Wizard<V>, R), WizardError> {
        let (kind, wizard) = self.take_finished(user).await?;
        let committed = commit(kind, &wizard);

        if let Err(e) = self.chat.send_message(user, &text::end(&self.prefix)).await {
            tracing::warn!("Failed to send wizard completion message to {}: {}", user, e);
        }
        Ok((kind, wizard, committed))
    }

    async fn take_finished(&self, user: &str) -> Result<(WizardKind, Wizard<V>), WizardError> {
        let mut guard = self.wizards.lock().await;
        match guard.get(user) {
            None => return Err(WizardError::NoActiveWizard),
            Some((_, wizard)) if !wizard.is_done() => return Err(WizardError::NotDone),
            Some(_) => {}
        }
        let (kind, wizard) = guard.remove(user).ok_or(WizardError::NoActiveWizard)?;
        tracing::info!("{}", logs::wizard_closed(kind.as_str(), user));
        Ok((kind, wizard))
    }

    /// Cancels whatever wizard the user has open. No-op when there is none.
    pub async fn cancel_wizards(&self, user: &str) -> Option<WizardKind> {
        let removed = self.wizards.lock().await.remove(user);
        let (kind, _) = removed?;
        tracing::info!("{}", logs::wizard_cancelled(kind.as_str(), user));

        let notice = match kind {
            WizardKind::New => text::CANCELLED_NEW,
            WizardKind::Edit => text::CANCELLED_EDIT,
        };
        if let Err(e) = self.chat.send_message(user, notice).await {
            tracing::warn!("Failed to send cancellation notice to {}: {}", user, e);
        }
        Some(kind)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.wizards.lock().await.len()
    }

    /// Serializes every open wizard as `{"new": {user: record}, "edit": {user: record}}`.
    pub async fn to_record(&self) -> Value {
        let guard = self.wizards.lock().await;
        let mut sections: HashMap<&'static str, Map<String, Value>> = HashMap::new();
        sections.insert(WizardKind::New.as_str(), Map::new());
        sections.insert(WizardKind::Edit.as_str(), Map::new());

        for (user, (kind, wizard)) in guard.iter() {
            match serde_json::to_value(wizard.to_record()) {
                Ok(value) => {
                    if let Some(section) = sections.get_mut(kind.as_str()) {
                        section.insert(user.clone(), value);
                    }
                }
                Err(e) => tracing::error!("Failed to serialize wizard for {}: {}", user, e),
            }
        }

        Value::Object(
            sections
                .into_iter()
                .map(|(name, map)| (name.to_string(), Value::Object(map)))
                .collect(),
        )
    }

    /// Restores wizards saved by `to_record`. Entries that fail to parse or re-validate are
    /// dropped with a warning instead of aborting the load.
    pub fn from_record(
        template: Arc<WizardTemplate<V>>,
        chat: Arc<dyn ChatProvider>,
        prefix: impl Into<String>,
        data: &Value,
    ) -> Self {
        let mut wizards = HashMap::new();

        for kind in [WizardKind::New, WizardKind::Edit] {
            let Some(section) = data.get(kind.as_str()).and_then(Value::as_object) else {
                continue;
            };
            for (user, entry) in section {
                if wizards.contains_key(user) {
                    tracing::warn!("{}", logs::wizard_dropped(kind.as_str(), user, "user already has a wizard"));
                    continue;
                }
                let record: WizardRecord = match serde_json::from_value(entry.clone()) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!("{}", logs::wizard_dropped(kind.as_str(), user, &e.to_string()));
                        continue;
                    }
                };
                if record.user_id != *user {
                    tracing::warn!("{}", logs::wizard_dropped(kind.as_str(), user, "owner mismatch"));
                    continue;
                }
                match Wizard::from_record(template.clone(), record, kind == WizardKind::Edit) {
                    Ok(wizard) => {
                        wizards.insert(user.clone(), (kind, wizard));
                    }
                    Err(e) => tracing::warn!("{}", logs::wizard_dropped(kind.as_str(), user, &e.to_string())),
                }
            }
        }

        tracing::info!("Restored {} open wizard(s)", wizards.len());
        Self {
            template,
            chat,
            prefix: prefix.into(),
            wizards: Mutex::new(wizards),
        }
    }
}
