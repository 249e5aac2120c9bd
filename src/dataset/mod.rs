// Dataset module
// JSON-file-backed Q&A dataset and category list used by the matching core


use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Result, SupportError};

/// Default category labels seeded when no category file exists yet.
pub const DEFAULT_CATEGORIES: &[&str] =
    &["CV", "Job Search", "Internship", "Appointment", "General"];

/// A single canonical Q&A record.
///
/// `id` values form a contiguous 1-based sequence across the dataset;
/// `questions` holds the ordered paraphrases that all map to `answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaEntry {
    pub id: u64,
    pub category: String,
    pub questions: Vec<String>,
    pub answer: String,
}

impl QaEntry {
    /// Check the required-field invariants for a single entry.
    fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(SupportError::Validation(format!(
                "entry {} has an empty category",
                self.id
            )));
        }
        if self.questions.is_empty() || self.questions.iter().any(|q| q.trim().is_empty()) {
            return Err(SupportError::Validation(format!(
                "entry {} must have at least one non-empty question",
                self.id
            )));
        }
        if self.answer.trim().is_empty() {
            return Err(SupportError::Validation(format!(
                "entry {} has an empty answer",
                self.id
            )));
        }
        Ok(())
    }
}

/// File-backed store for the full `QaEntry` collection.
///
/// The dataset is a JSON array on disk. Reads validate the schema and the
/// contiguous-id invariant up front so a malformed file fails fast instead
/// of surfacing as a lookup fault deep inside a request handler. Writes go
/// through a temp file and rename, so readers never observe a half-written
/// array.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    #[inline]
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the dataset. A missing file is an empty dataset.
    #[inline]
    pub fn load(&self) -> Result<Vec<QaEntry>> {
        if !self.path.exists() {
            debug!("Dataset file {} does not exist yet", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let entries: Vec<QaEntry> = serde_json::from_str(&content).map_err(|e| {
            SupportError::Dataset(format!(
                "failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })?;

        validate_entries(&entries)?;
        Ok(entries)
    }

    /// Replace the whole dataset after validating it.
    #[inline]
    pub fn save(&self, entries: &[QaEntry]) -> Result<()> {
        validate_entries(entries)?;

        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| SupportError::Dataset(format!("failed to serialize dataset: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Temp-file-then-rename keeps the replacement atomic for readers.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            "Wrote {} dataset entries to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Append a new entry. Its id must be the next value in the sequence.
    #[inline]
    pub fn create(&self, entry: QaEntry) -> Result<Vec<QaEntry>> {
        entry.validate()?;
        let mut entries = self.load()?;

        let expected = entries.len() as u64 + 1;
        if entry.id != expected {
            return Err(SupportError::Validation(format!(
                "new entry id must be {} (the next in sequence), got {}",
                expected, entry.id
            )));
        }

        entries.push(entry);
        self.save(&entries)?;
        info!("Created dataset entry {}", expected);
        Ok(entries)
    }

    /// Replace an existing entry in place, matched by id.
    #[inline]
    pub fn update(&self, entry: QaEntry) -> Result<Vec<QaEntry>> {
        entry.validate()?;
        let mut entries = self.load()?;

        let Some(slot) = entries.iter_mut().find(|e| e.id == entry.id) else {
            return Err(SupportError::Validation(format!(
                "no dataset entry with id {}",
                entry.id
            )));
        };
        *slot = entry;

        self.save(&entries)?;
        Ok(entries)
    }

    /// Delete an entry by id and renumber the remainder so ids stay a
    /// contiguous 1..=N sequence.
    #[inline]
    pub fn delete(&self, id: u64) -> Result<Vec<QaEntry>> {
        let mut entries = self.load()?;

        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return Err(SupportError::Validation(format!(
                "no dataset entry with id {}",
                id
            )));
        };
        entries.remove(pos);

        for (i, entry) in entries.iter_mut().enumerate() {
            entry.id = i as u64 + 1;
        }

        self.save(&entries)?;
        info!("Deleted dataset entry {}, {} remain", id, entries.len());
        Ok(entries)
    }
}

fn validate_entries(entries: &[QaEntry]) -> Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        let expected = i as u64 + 1;
        if entry.id != expected {
            return Err(SupportError::Dataset(format!(
                "dataset ids must be contiguous starting at 1: position {} has id {}",
                i, entry.id
            )));
        }
        entry.validate()?;
    }
    Ok(())
}

/// File-backed category label list for the classifier.
#[derive(Debug, Clone)]
pub struct CategoryStore {
    path: PathBuf,
}

impl CategoryStore {
    #[inline]
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the category list, seeding the defaults when no file exists.
    #[inline]
    pub fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(DEFAULT_CATEGORIES.iter().map(|c| (*c).to_string()).collect());
        }

        let content = fs::read_to_string(&self.path)?;
        let categories: Vec<String> = serde_json::from_str(&content).map_err(|e| {
            SupportError::Dataset(format!(
                "failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(categories)
    }

    /// Add a category, rejecting empty names and duplicates.
    #[inline]
    pub fn add(&self, name: &str) -> Result<Vec<String>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SupportError::Validation(
                "category name cannot be empty".to_string(),
            ));
        }

        let mut categories = self.load()?;
        if categories.iter().any(|c| c == name) {
            return Err(SupportError::Validation(format!(
                "category '{}' already exists",
                name
            )));
        }
        categories.push(name.to_string());

        let content = serde_json::to_string_pretty(&categories)
            .map_err(|e| SupportError::Dataset(format!("failed to serialize categories: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        info!("Added category '{}'", name);
        Ok(categories)
    }
}
