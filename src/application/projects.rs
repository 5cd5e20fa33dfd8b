//! # Projects
//!
//! The project registration wizard: its questions, the genre/type catalog the
//! questions draw from, and the `Project` record a finished wizard produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::application::state::RuntimeState;
use crate::application::wizard::{Prompt, Wizard, WizardTemplate, len_validator};
use crate::domain::config::ProjectsConfig;
use crate::domain::types::{UserId, WizardKind};
use crate::strings::wizard as text;

pub const MAX_TITLE: usize = 100;
pub const MAX_SHORT: usize = 32;
pub const MAX_PITCH_WORDS: usize = 70;

pub const STATE_SECTION: &str = "projects";

/// Genres and project types users may pick from. Shared with the computed prompts,
/// so changes show up the next time the question is asked.
#[derive(Debug, Default)]
pub struct Catalog {
    genres: RwLock<Vec<String>>,
    types: RwLock<Vec<String>>,
}

impl Catalog {
    pub fn from_config(config: &ProjectsConfig) -> Self {
        Self {
            genres: RwLock::new(config.genres.clone()),
            types: RwLock::new(config.types.clone()),
        }
    }

    pub fn genres(&self) -> Vec<String> {
        self.genres.read().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn types(&self) -> Vec<String> {
        self.types.read().map(|t| t.clone()).unwrap_or_default()
    }

    #[cfg(test)]
    pub fn add_genre(&self, name: &str) {
        if let Ok(mut genres) = self.genres.write()
            && !genres.iter().any(|g| g.eq_ignore_ascii_case(name))
        {
            genres.push(name.to_string());
        }
    }

    pub fn find_genre(&self, name: &str) -> Result<String, String> {
        find(&self.genres(), name).ok_or_else(|| format!("Unknown genre '{}'", name.trim()))
    }

    pub fn find_type(&self, name: &str) -> Result<String, String> {
        find(&self.types(), name).ok_or_else(|| format!("Unknown project type '{}'", name.trim()))
    }
}

fn find(options: &[String], name: &str) -> Option<String> {
    let name = name.trim();
    options.iter().find(|o| o.eq_ignore_ascii_case(name)).cloned()
}

/// Validated answer of a project wizard question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectField {
    Text(String),
    Genre(String),
    Kind(String),
}

impl ProjectField {
    pub fn as_str(&self) -> &str {
        match self {
            ProjectField::Text(s) | ProjectField::Genre(s) | ProjectField::Kind(s) => s,
        }
    }
}

impl fmt::Display for ProjectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn count_words(s: &str) -> usize {
    s.split_whitespace().count()
}

fn pitch_validator(s: &str) -> Result<ProjectField, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Answer cannot be empty.".to_string());
    }
    let wc = count_words(s);
    if wc > MAX_PITCH_WORDS {
        return Err(format!("Elevator pitch too long ({wc} words, max {MAX_PITCH_WORDS})"));
    }
    Ok(ProjectField::Text(s.to_string()))
}

fn text_field(max: usize) -> impl Fn(&str) -> Result<ProjectField, String> + Send + Sync + 'static {
    let validate = len_validator(max);
    move |s: &str| validate(s).map(ProjectField::Text)
}

/// Builds the project wizard: title, genre, subgenre (optional), type, pitch.
pub fn project_template(catalog: Arc<Catalog>, skip_token: &str) -> WizardTemplate<ProjectField> {
    let genre_prompt = catalog.clone();
    let genre_check = catalog.clone();
    let type_prompt = catalog.clone();
    let type_check = catalog;

    WizardTemplate::new(skip_token)
        .question("title", text::TITLE, text_field(MAX_TITLE))
        .question(
            "genre",
            Prompt::computed(move || text::genre(&genre_prompt.genres().join(", "))),
            move |s: &str| genre_check.find_genre(s).map(ProjectField::Genre),
        )
        .question(
            "subgenre",
            Prompt::Static(text::subgenre(skip_token)),
            text_field(MAX_SHORT),
        )
        .optional()
        .question(
            "type",
            Prompt::computed(move || text::project_type(&type_prompt.types().join(", "))),
            move |s: &str| type_check.find_type(s).map(ProjectField::Kind),
        )
        .question("pitch", text::PITCH, pitch_validator)
        .serialize_with(|v: &ProjectField| v.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
}

/// A registered project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub owner: UserId,
    pub title: String,
    pub genre: String,
    #[serde(default)]
    pub subgenre: Option<String>,
    pub kind: String,
    pub pitch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Builds a project from a finished 'new' wizard.
    pub fn from_wizard(wizard: &Wizard<ProjectField>) -> Result<Self, String> {
        let mut answers = wizard.serialized_answers();
        let subgenre = answers.remove("subgenre");
        let mut required = |key: &str| {
            answers
                .remove(key)
                .ok_or_else(|| format!("missing answer for '{key}'"))
        };
        Ok(Self {
            owner: wizard.owner().to_string(),
            title: required("title")?,
            genre: required("genre")?,
            subgenre,
            kind: required("type")?,
            pitch: required("pitch")?,
            created_at: wizard.created_at(),
            updated_at: wizard.created_at(),
        })
    }

    /// Applies the answers of a finished 'edit' wizard. Skipped questions keep their value.
    pub fn apply_edit(&mut self, wizard: &Wizard<ProjectField>, now: DateTime<Utc>) {
        for (key, value) in wizard.serialized_answers() {
            match key.as_str() {
                "title" => self.title = value,
                "genre" => self.genre = value,
                "subgenre" => self.subgenre = Some(value),
                "type" => self.kind = value,
                "pitch" => self.pitch = value,
                other => tracing::debug!("Ignoring unknown project field '{}'", other),
            }
        }
        self.updated_at = now;
    }
}

/// Registered projects, one per owner.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: BTreeMap<UserId, Project>,
}

impl ProjectRegistry {
    pub fn load(state: &RuntimeState) -> Self {
        let mut projects = BTreeMap::new();
        for (owner, value) in state.section(STATE_SECTION) {
            match serde_json::from_value::<Project>(value.clone()) {
                Ok(project) => {
                    projects.insert(owner.clone(), project);
                }
                Err(e) => tracing::warn!("Dropping saved project of {}: {}", owner, e),
            }
        }
        Self { projects }
    }

    pub fn save(&self, state: &mut RuntimeState) {
        let entries = self
            .projects
            .iter()
            .filter_map(|(owner, project)| match serde_json::to_value(project) {
                Ok(v) => Some((owner.clone(), v)),
                Err(e) => {
                    tracing::error!("Failed to serialize project of {}: {}", owner, e);
                    None
                }
            })
            .collect();
        state.set_section(STATE_SECTION, entries);
    }

    pub fn get(&self, owner: &str) -> Option<&Project> {
        self.projects.get(owner)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Stores the outcome of a closed wizard and returns the resulting project.
    pub fn apply(
        &mut self,
        kind: WizardKind,
        wizard: &Wizard<ProjectField>,
        now: DateTime<Utc>,
    ) -> Result<Project, String> {
        let owner = wizard.owner().to_string();
        let project = match (kind, self.projects.get_mut(&owner)) {
            (WizardKind::Edit, Some(existing)) => {
                existing.apply_edit(wizard, now);
                existing.clone()
            }
            (WizardKind::Edit, None) => return Err(format!("{owner} has no project to edit")),
            (WizardKind::New, _) => Project::from_wizard(wizard)?,
        };
        self.projects.insert(owner, project.clone());
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ProjectsConfig;

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::from_config(&ProjectsConfig {
            genres: vec!["Fantasy".to_string(), "Horror".to_string()],
            types: vec!["Novel".to_string()],
        }))
    }

    fn finished(kind: WizardKind, answers: &[&str]) -> Wizard<ProjectField> {
        let template = Arc::new(project_template(catalog(), "none"));
        let mut wizard = match kind {
            WizardKind::New => Wizard::new(template, "@u:x", Utc::now()),
            WizardKind::Edit => Wizard::new_edit(template, "@u:x", Utc::now()),
        };
        for a in answers {
            wizard.answer(a).unwrap();
        }
        assert!(wizard.is_done());
        wizard
    }

    #[test]
    fn test_genre_prompt_reflects_catalog_changes() {
        let catalog = catalog();
        let template = Arc::new(project_template(catalog.clone(), "none"));
        let mut wizard = Wizard::new(template, "@u:x", Utc::now());
        wizard.answer("Book").unwrap();

        assert!(wizard.question().unwrap().contains("Fantasy, Horror."));
        catalog.add_genre("Mystery");
        assert!(wizard.question().unwrap().contains("Fantasy, Horror, Mystery."));
        assert_eq!(wizard.answer("mystery"), Ok(()));
        assert_eq!(wizard.get("genre"), Some(&ProjectField::Genre("Mystery".to_string())));
    }

    #[test]
    fn test_pitch_word_limit() {
        let long = vec!["word"; MAX_PITCH_WORDS + 1].join(" ");
        assert!(pitch_validator(&long).unwrap_err().contains("too long"));
        assert!(pitch_validator("A short pitch").is_ok());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert_eq!(
            catalog().find_type("Poem"),
            Err("Unknown project type 'Poem'".to_string())
        );
        assert_eq!(catalog().find_type(" novel "), Ok("Novel".to_string()));
    }

    #[test]
    fn test_new_then_edit_keeps_skipped_fields() {
        let mut registry = ProjectRegistry::default();
        let wizard = finished(WizardKind::New, &["My Book", "fantasy", "none", "novel", "Dragons."]);
        let project = registry.apply(WizardKind::New, &wizard, Utc::now()).unwrap();
        assert_eq!(project.title, "My Book");
        assert_eq!(project.genre, "Fantasy");
        assert_eq!(project.subgenre, None);

        let edit = finished(WizardKind::Edit, &["none", "horror", "Grimdark", "none", "none"]);
        let project = registry.apply(WizardKind::Edit, &edit, Utc::now()).unwrap();
        assert_eq!(project.title, "My Book");
        assert_eq!(project.genre, "Horror");
        assert_eq!(project.subgenre.as_deref(), Some("Grimdark"));
        assert_eq!(project.pitch, "Dragons.");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_pitch_stored_on_one_line() {
        let wizard = finished(WizardKind::New, &["My Book", "fantasy", "none", "novel", "Dragons\n  knit."]);
        let project = Project::from_wizard(&wizard).unwrap();
        assert_eq!(project.pitch, "Dragons knit.");
        assert_eq!(project.kind, "Novel");
    }

    #[test]
    fn test_edit_without_project_fails() {
        let mut registry = ProjectRegistry::default();
        let edit = finished(WizardKind::Edit, &["none", "none", "none", "none", "none"]);
        assert!(registry.apply(WizardKind::Edit, &edit, Utc::now()).is_err());
    }

    #[test]
    fn test_registry_persists_through_state() {
        let mut registry = ProjectRegistry::default();
        let wizard = finished(WizardKind::New, &["My Book", "fantasy", "Epic", "novel", "Dragons."]);
        registry.apply(WizardKind::New, &wizard, Utc::now()).unwrap();

        let mut state = RuntimeState::in_memory();
        registry.save(&mut state);
        let reloaded = ProjectRegistry::load(&state);
        assert_eq!(reloaded.get("@u:x"), registry.get("@u:x"));
    }
}
