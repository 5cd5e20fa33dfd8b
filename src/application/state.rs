//! # Runtime State
//!
//! Sectioned key/value store persisted as JSON (`data/state.json`).
//! Cogs keep whatever they need to survive a restart here: open wizards, registered
//! projects. Values are stored as raw JSON and decoded on read.

use anyhow::{Context, Result};
use serde::Serialize;
#[cfg(test)]
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

type Sections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
pub struct RuntimeState {
    path: Option<PathBuf>,
    sections: Sections,
}

impl RuntimeState {
    /// A state that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the state from `path` or starts empty when the file is missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let sections = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Sections>(&content) {
                Ok(sections) => sections,
                Err(e) => {
                    tracing::warn!("Ignoring corrupt state file {}: {}", path.display(), e);
                    Sections::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Sections::new(),
            Err(e) => {
                tracing::warn!("Cannot read state file {}: {}", path.display(), e);
                Sections::new()
            }
        };
        Self {
            path: Some(path),
            sections,
        }
    }

    /// Decodes the value stored under `section`/`key`.
    #[cfg(test)]
    pub fn get<T: DeserializeOwned>(&self, section: &str, key: &str) -> Option<T> {
        let value = self.sections.get(section)?.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("State entry {}.{} has an unexpected shape: {}", section, key, e);
                None
            }
        }
    }

    pub fn get_raw(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section)?.get(key)
    }

    /// All entries of a section, undecoded.
    pub fn section(&self, section: &str) -> impl Iterator<Item = (&String, &Value)> {
        self.sections.get(section).into_iter().flat_map(|s| s.iter())
    }

    pub fn set<T: Serialize>(&mut self, section: &str, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("Failed to encode state entry {section}.{key}"))?;
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Replaces a whole section.
    pub fn set_section(&mut self, section: &str, entries: BTreeMap<String, Value>) {
        self.sections.insert(section.to_string(), entries);
    }

    /// Persists the state. No-op for in-memory state.
    pub fn write(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.sections)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}
