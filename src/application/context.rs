//! # Bot Context
//!
//! Process-wide state shared by the supervisor, every session and the cogs.
//! Created once at startup from the runtime state file and flushed back to it
//! whenever a session ends and at shutdown.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::application::projects::{Catalog, ProjectField, ProjectRegistry, project_template};
use crate::application::state::RuntimeState;
use crate::application::wizard_manager::WizardManager;
use crate::domain::config::AppConfig;
use crate::domain::traits::ChatProvider;
use crate::strings::logs;

const WIZARD_SECTION: &str = "wizards";
const WIZARD_KEY: &str = "projects";

pub struct BotContext {
    pub config: AppConfig,
    pub chat: Arc<dyn ChatProvider>,
    pub wizards: WizardManager<ProjectField>,
    pub projects: Mutex<ProjectRegistry>,
    state: Mutex<RuntimeState>,
    /// Fired on user interrupt; observed by the session and the supervisor.
    pub shutdown: CancellationToken,
}

impl BotContext {
    /// Restores wizards and projects from `state`.
    pub fn init(config: AppConfig, chat: Arc<dyn ChatProvider>, state: RuntimeState) -> Self {
        let catalog = Arc::new(Catalog::from_config(&config.projects));
        let template = Arc::new(project_template(catalog, &config.wizard.skip_token));

        let prefix = config.system.command_prefix.clone();
        let wizards = match state.get_raw(WIZARD_SECTION, WIZARD_KEY) {
            Some(data) => WizardManager::from_record(template, chat.clone(), prefix, data),
            None => WizardManager::new(template, chat.clone(), prefix),
        };
        let projects = ProjectRegistry::load(&state);
        tracing::info!("Loaded {} registered project(s)", projects.len());

        Self {
            config,
            chat,
            wizards,
            projects: Mutex::new(projects),
            state: Mutex::new(state),
            shutdown: CancellationToken::new(),
        }
    }

    /// Writes every cog's state to the runtime state file.
    pub async fn persist(&self) -> Result<()> {
        let wizards = self.wizards.to_record().await;
        let mut state = self.state.lock().await;
        state.set(WIZARD_SECTION, WIZARD_KEY, &wizards)?;
        self.projects.lock().await.save(&mut state);
        state.write()
    }

    /// Final flush before the process exits.
    pub async fn shutdown(&self) {
        tracing::info!("{}", logs::SHUTDOWN);
        self.shutdown.cancel();
        if let Err(e) = self.persist().await {
            tracing::error!("{}", logs::state_write_failed(&format!("{e:#}")));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::wizard_manager::tests::RecordingChat;
    use chrono::Utc;
    use tempfile::TempDir;

    pub(crate) fn test_config() -> AppConfig {
        AppConfig::parse(
            r#"
services:
  matrix:
    username: bot
    password: secret
    homeserver: https://matrix.example.org
projects:
  genres: [Fantasy, Horror]
  types: [Novel]
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_persist_and_restore() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let chat = Arc::new(RecordingChat::default());

        let ctx = BotContext::init(test_config(), chat.clone(), RuntimeState::load(&path));
        ctx.wizards.create_new_wizard("@u:x", Utc::now()).await.unwrap();
        ctx.wizards.process_answer("@u:x", "My Book").await.unwrap();
        ctx.persist().await.unwrap();

        let restored = BotContext::init(test_config(), chat, RuntimeState::load(&path));
        let (_, wizard) = restored.wizards.get_wizard_for("@u:x").await.unwrap();
        assert_eq!(wizard.current_index(), 1);
        assert_eq!(wizard.get("title").unwrap().as_str(), "My Book");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_token() {
        let ctx = BotContext::init(test_config(), Arc::new(RecordingChat::default()), RuntimeState::in_memory());
        assert!(!ctx.shutdown.is_cancelled());
        ctx.shutdown().await;
        assert!(ctx.shutdown.is_cancelled());
    }
}
