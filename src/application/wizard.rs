//! # Wizard Engine
//!
//! A per-user, multi-step question/answer sequence.
//!
//! A `WizardTemplate` describes the questions once (order, prompts, validators,
//! serializers, optional keys). Each `Wizard` walks one user through that template,
//! keeping both the raw text and the validated value of every answer. Only the raw
//! answers are persisted; restoring re-runs the validators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::domain::error::WizardError;
use crate::domain::types::UserId;

/// Question text, either fixed or computed when the question is asked.
#[derive(Clone)]
pub enum Prompt {
    Static(String),
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Prompt {
    pub fn computed(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Prompt::Computed(Arc::new(f))
    }

    pub fn resolve(&self) -> String {
        match self {
            Prompt::Static(text) => text.clone(),
            Prompt::Computed(f) => f(),
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Static(text.to_string())
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Prompt::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

pub type Validator<V> = Arc<dyn Fn(&str) -> Result<V, String> + Send + Sync>;
pub type Serializer<V> = Arc<dyn Fn(&V) -> String + Send + Sync>;

struct Question<V> {
    key: String,
    prompt: Prompt,
    validator: Validator<V>,
    serializer: Option<Serializer<V>>,
}

/// Shared description of a wizard's questions.
pub struct WizardTemplate<V> {
    questions: Vec<Question<V>>,
    optional: HashSet<String>,
    skip_token: String,
}

impl<V> WizardTemplate<V> {
    pub fn new(skip_token: impl Into<String>) -> Self {
        Self {
            questions: Vec::new(),
            optional: HashSet::new(),
            skip_token: skip_token.into(),
        }
    }

    /// Appends a question. Keys are asked in the order they are added.
    pub fn question(
        mut self,
        key: &str,
        prompt: impl Into<Prompt>,
        validator: impl Fn(&str) -> Result<V, String> + Send + Sync + 'static,
    ) -> Self {
        self.questions.push(Question {
            key: key.to_string(),
            prompt: prompt.into(),
            validator: Arc::new(validator),
            serializer: None,
        });
        self
    }

    /// Custom serializer for the most recently added question.
    pub fn serialize_with(mut self, serializer: impl Fn(&V) -> String + Send + Sync + 'static) -> Self {
        if let Some(last) = self.questions.last_mut() {
            last.serializer = Some(Arc::new(serializer));
        }
        self
    }

    /// Marks the most recently added question as optional.
    pub fn optional(mut self) -> Self {
        if let Some(last) = self.questions.last() {
            self.optional.insert(last.key.clone());
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.questions.iter().map(|q| q.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn skip_token(&self) -> &str {
        &self.skip_token
    }

    fn is_skip(&self, raw: &str) -> bool {
        raw.trim().eq_ignore_ascii_case(&self.skip_token)
    }
}

/// Persisted form of a wizard. Validated values are rebuilt on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardRecord {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub current_index: usize,
    #[serde(default)]
    pub raw_answers: HashMap<String, String>,
}

#[derive(Clone)]
pub struct Wizard<V> {
    template: Arc<WizardTemplate<V>>,
    owner: UserId,
    created_at: DateTime<Utc>,
    index: usize,
    optional: HashSet<String>,
    answers: HashMap<String, V>,
    raw_answers: HashMap<String, String>,
}

impl<V: Clone + fmt::Display> Wizard<V> {
    pub fn new(template: Arc<WizardTemplate<V>>, owner: impl Into<UserId>, created_at: DateTime<Utc>) -> Self {
        let optional = template.optional.clone();
        Self {
            template,
            owner: owner.into(),
            created_at,
            index: 0,
            optional,
            answers: HashMap::new(),
            raw_answers: HashMap::new(),
        }
    }

    /// An edit wizard: every question may be skipped to keep the previous value.
    pub fn new_edit(template: Arc<WizardTemplate<V>>, owner: impl Into<UserId>, created_at: DateTime<Utc>) -> Self {
        let mut wizard = Self::new(template, owner, created_at);
        wizard.make_all_optional();
        wizard
    }

    fn make_all_optional(&mut self) {
        self.optional = self.template.keys().map(str::to_string).collect();
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[cfg(test)]
    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.template.len()
    }

    #[cfg(test)]
    pub fn is_optional(&self, key: &str) -> bool {
        self.optional.contains(key)
    }

    /// Prompt for the current question, evaluated now.
    pub fn question(&self) -> Result<String, WizardError> {
        self.template
            .questions
            .get(self.index)
            .map(|q| q.prompt.resolve())
            .ok_or(WizardError::Done)
    }

    /// Feeds one answer to the current question.
    ///
    /// A rejected answer leaves the wizard on the same question.
    pub fn answer(&mut self, raw: &str) -> Result<(), WizardError> {
        let question = self.template.questions.get(self.index).ok_or(WizardError::Done)?;

        if self.optional.contains(&question.key) && self.template.is_skip(raw) {
            self.index += 1;
            return Ok(());
        }

        let value = (question.validator)(raw).map_err(WizardError::Validation)?;
        let key = question.key.clone();
        self.raw_answers.insert(key.clone(), raw.to_string());
        self.answers.insert(key, value);
        self.index += 1;
        Ok(())
    }

    #[cfg(test)]
    pub fn answers(&self) -> &HashMap<String, V> {
        &self.answers
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.answers.get(key)
    }

    #[cfg(test)]
    pub fn raw_answers(&self) -> &HashMap<String, String> {
        &self.raw_answers
    }

    /// Validated answers rendered through each question's serializer.
    pub fn serialized_answers(&self) -> BTreeMap<String, String> {
        self.template
            .questions
            .iter()
            .filter_map(|q| {
                self.answers.get(&q.key).map(|v| {
                    let text = match &q.serializer {
                        Some(serialize) => serialize(v),
                        None => v.to_string(),
                    };
                    (q.key.clone(), text)
                })
            })
            .collect()
    }

    pub fn to_record(&self) -> WizardRecord {
        WizardRecord {
            user_id: self.owner.clone(),
            created_at: self.created_at,
            current_index: self.index,
            raw_answers: self.raw_answers.clone(),
        }
    }

    /// Rebuilds a wizard from its record, re-validating every stored answer.
    pub fn from_record(
        template: Arc<WizardTemplate<V>>,
        record: WizardRecord,
        all_optional: bool,
    ) -> Result<Self, WizardError> {
        let mut wizard = Self::new(template.clone(), record.user_id, record.created_at);
        if all_optional {
            wizard.make_all_optional();
        }

        if record.current_index > template.len() {
            return Err(WizardError::Restore {
                key: "current_index".to_string(),
                reason: format!("{} is past the last question", record.current_index),
            });
        }

        for question in template.questions.iter().take(record.current_index) {
            match record.raw_answers.get(&question.key) {
                Some(raw) => {
                    let value = (question.validator)(raw).map_err(|reason| WizardError::Restore {
                        key: question.key.clone(),
                        reason,
                    })?;
                    wizard.raw_answers.insert(question.key.clone(), raw.clone());
                    wizard.answers.insert(question.key.clone(), value);
                }
                None if wizard.optional.contains(&question.key) => {}
                None => {
                    return Err(WizardError::Restore {
                        key: question.key.clone(),
                        reason: "missing answer".to_string(),
                    });
                }
            }
        }
        wizard.index = record.current_index;
        Ok(wizard)
    }
}

impl<V> fmt::Debug for Wizard<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wizard")
            .field("owner", &self.owner)
            .field("created_at", &self.created_at)
            .field("index", &self.index)
            .field("raw_answers", &self.raw_answers)
            .finish()
    }
}

/// Validator accepting any text up to `max` characters.
pub fn len_validator(max: usize) -> impl Fn(&str) -> Result<String, String> + Send + Sync + 'static {
    move |s: &str| {
        let s = s.trim();
        let len = s.chars().count();
        if len == 0 {
            Err("Answer cannot be empty.".to_string())
        } else if len > max {
            Err(format!("Answer too long ({len} characters, max {max})"))
        } else {
            Ok(s.to_string())
        }
    }
}
