//! Persisted validator settings.
//!
//! The judge model and criteria text survive between runs through a
//! [`SettingsStore`]. The store is injected wherever settings are read or
//! written, so nothing touches a global location directly.

use crate::error::{Result, ValidatorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const JUDGE_MODEL_KEY: &str = "validator.judge_model";
const CRITERIA_KEY: &str = "validator.criteria";
const JUDGE_MODEL_ENV: &str = "JUDGE_MODEL";

/// Default criteria offered when nothing has been configured.
pub const DEFAULT_CRITERIA: &str = "Accuracy, Completeness, Relevance, Clarity";

/// Minimal string key-value store.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store, mostly for tests and one-off runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|e| ValidatorError::Settings(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| ValidatorError::Settings(e.to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| ValidatorError::Settings(e.to_string()))?;
        values.remove(key);
        Ok(())
    }
}

/// Store backed by a single pretty-printed JSON object on disk.
///
/// Every write rewrites the whole file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Default location under the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-validator")
            .map(|dirs| dirs.data_dir().join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| ValidatorError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            ValidatorError::Settings(format!("corrupt settings file {}: {}", self.path.display(), e))
        })
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ValidatorError::io(parent, e))?;
            }
        }
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| ValidatorError::Serialization(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| ValidatorError::io(&self.path, e))
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|e| ValidatorError::Settings(e.to_string()))
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.guard()?;
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

/// Settings passed explicitly into every validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSettings {
    /// Model id of the judge.
    pub judge_model: String,
    /// Free-form criteria list, e.g. `"Accuracy, Clarity"`.
    pub criteria: String,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            judge_model: "gpt-4o".to_string(),
            criteria: DEFAULT_CRITERIA.to_string(),
        }
    }
}

impl ValidatorSettings {
    /// Load settings, falling back to `defaults` field by field.
    pub fn load(store: &dyn SettingsStore, defaults: &ValidatorSettings) -> Result<Self> {
        let judge_model = store
            .get(JUDGE_MODEL_KEY)?
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults.judge_model.clone());
        let criteria = store
            .get(CRITERIA_KEY)?
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| defaults.criteria.clone());

        Ok(Self {
            judge_model,
            criteria,
        })
    }

    /// Replace the judge model with `judge` unless it is missing or blank.
    pub fn with_judge_override(mut self, judge: Option<String>) -> Self {
        if let Some(judge) = judge.filter(|j| !j.trim().is_empty()) {
            self.judge_model = judge;
        }
        self
    }

    /// Let `JUDGE_MODEL` take precedence over a persisted judge model.
    pub fn with_env_overrides(self) -> Self {
        let judge = env::var(JUDGE_MODEL_ENV).ok();
        self.with_judge_override(judge)
    }

    pub fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        store.set(JUDGE_MODEL_KEY, &self.judge_model)?;
        store.set(CRITERIA_KEY, &self.criteria)
    }

    /// Forget persisted values so the defaults apply again.
    pub fn clear(store: &dyn SettingsStore) -> Result<()> {
        store.remove(JUDGE_MODEL_KEY)?;
        store.remove(CRITERIA_KEY)
    }
}
