//! Three-way reconciliation of the new source catalog against the old source
//! and old translation catalogs.
//!
//! The engine owns the ordered entry set. Hosts read entries through
//! [`Engine::entries`] and change them only through the operations below.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::model::entry::{Entry, EntryStatus, PluralForms};
use crate::model::record::RawRecord;
use crate::services::merge;

/// Tally of statuses, for logging and for hosts that show progress.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub new: usize,
    pub modified: usize,
    pub normal: usize,
    pub deleted: usize,
    pub saved: usize,
}

/// A unit of machine-translation work, captured when a batch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationJob {
    pub index: usize,
    pub key: String,
    pub is_plural: bool,
    pub status: EntryStatus,
    pub source_text: String,
}

/// Replacement text for [`Engine::manual_edit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualEdit {
    Singular(String),
    Plural(PluralForms),
}

#[derive(Debug, Default)]
pub struct Engine {
    entries: Vec<Entry>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> EngineResult<&Entry> {
        self.entries.get(index).ok_or(EngineError::EntryIndex(index))
    }

    pub fn is_loaded(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Replaces the whole entry set with one `New` entry per record, in file order.
    pub fn ingest_new_source(&mut self, records: Vec<RawRecord>) -> usize {
        self.entries = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                let is_plural = r.is_plural();
                let new_source_text = r.primary_text(is_plural).to_string();
                Entry {
                    sequence_id: Some(i as u32 + 1),
                    key: r.key,
                    is_plural,
                    plural_key: if is_plural { r.plural_key } else { String::new() },
                    new_source_text,
                    old_source_text: String::new(),
                    status: EntryStatus::New,
                    translated_text: String::new(),
                    translated_plural: PluralForms::new(),
                }
            })
            .collect();

        info!(count = self.entries.len(), "new source catalog loaded");
        self.entries.len()
    }

    /// Classifies every current entry against the old source catalog and appends
    /// a `Deleted` entry for each old key that no longer exists.
    ///
    /// Statuses are recomputed from scratch, so re-running this after edits
    /// overwrites `Saved`. Hosts must not reload the old source once editing began.
    pub fn align_old_source(&mut self, records: Vec<RawRecord>) -> EngineResult<StatusCounts> {
        if !self.is_loaded() {
            return Err(EngineError::Precondition("load the new source catalog first"));
        }

        let old_map: HashMap<&str, &RawRecord> =
            records.iter().map(|r| (r.key.as_str(), r)).collect();

        let mut seen: HashSet<String> = HashSet::new();

        for entry in self.entries.iter_mut().filter(|e| !e.is_deleted()) {
            seen.insert(entry.key.clone());

            let Some(old) = old_map.get(entry.key.as_str()) else {
                entry.status = EntryStatus::New;
                continue;
            };

            entry.old_source_text = old.primary_text(entry.is_plural).to_string();

            let plural_changed = entry.is_plural && old.plural_key != entry.plural_key;
            let text_changed = entry.new_source_text != entry.old_source_text;

            entry.status = if plural_changed || text_changed {
                EntryStatus::Modified
            } else {
                EntryStatus::Normal
            };
        }

        // A re-run must not duplicate the removed entries from an earlier run.
        let already_deleted: HashSet<&str> = self
            .entries
            .iter()
            .filter(|e| e.is_deleted())
            .map(|e| e.key.as_str())
            .collect();

        let mut removed: Vec<Entry> = Vec::new();
        let mut appended: HashSet<&str> = HashSet::new();

        for old in &records {
            let key = old.key.as_str();
            if seen.contains(key) || already_deleted.contains(key) || !appended.insert(key) {
                continue;
            }

            let is_plural = old.is_plural();
            removed.push(Entry {
                sequence_id: None,
                key: old.key.clone(),
                is_plural,
                plural_key: old.plural_key.clone(),
                new_source_text: String::new(),
                old_source_text: old.primary_text(is_plural).to_string(),
                status: EntryStatus::Deleted,
                translated_text: String::new(),
                translated_plural: PluralForms::new(),
            });
        }

        debug!(removed = removed.len(), "old source keys missing from new catalog");
        self.entries.extend(removed);

        let counts = self.status_counts();
        info!(
            new = counts.new,
            modified = counts.modified,
            normal = counts.normal,
            deleted = counts.deleted,
            "old source catalog compared"
        );
        Ok(counts)
    }

    /// Seeds translations from the old translated catalog. Statuses are untouched.
    /// Returns the number of entries that found a counterpart.
    pub fn align_old_translation(&mut self, records: Vec<RawRecord>) -> EngineResult<usize> {
        if !self.is_loaded() {
            return Err(EngineError::Precondition("load the new source catalog first"));
        }

        let old_map: HashMap<&str, &RawRecord> =
            records.iter().map(|r| (r.key.as_str(), r)).collect();

        let mut paired = 0usize;

        for entry in self.entries.iter_mut() {
            let Some(old) = old_map.get(entry.key.as_str()) else {
                continue;
            };

            if entry.is_plural {
                if !old.plural_texts.is_empty() {
                    entry.translated_plural = old.plural_texts.clone();
                } else if !old.singular_text.is_empty() {
                    entry.translated_plural = PluralForms::from([(0, old.singular_text.clone())]);
                }
            } else {
                entry.translated_text = old.singular_text.clone();
            }

            paired += 1;
        }

        info!(paired, "translation loaded");
        Ok(paired)
    }

    /// Entries a batch run should translate, with their status frozen at this moment.
    pub fn translation_jobs(&self) -> Vec<TranslationJob> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| merge::qualifies_for_translation(e))
            .map(|(index, e)| TranslationJob {
                index,
                key: e.key.clone(),
                is_plural: e.is_plural,
                status: e.status,
                source_text: e.translation_source().to_string(),
            })
            .collect()
    }

    /// Merges a machine-translation result into the entry the job was built from.
    /// `job.status` is the status captured at batch start, not the live one.
    ///
    /// Returns `None` without touching the entry when the operator already
    /// saved it (edit or accept) after the job was queued.
    pub fn apply_translation_result(
        &mut self,
        job: &TranslationJob,
        machine_result: &str,
    ) -> EngineResult<Option<&Entry>> {
        let entry = self
            .entries
            .get_mut(job.index)
            .ok_or(EngineError::EntryIndex(job.index))?;

        if entry.key != job.key {
            return Err(EngineError::Precondition(
                "entry set was replaced while the translation was running",
            ));
        }

        if entry.status == EntryStatus::Saved {
            info!(key = %job.key, "machine result skipped, edited during batch");
            return Ok(None);
        }

        if entry.is_plural {
            entry.translated_plural =
                merge::merge_plural(&entry.translated_plural, job.status, machine_result);
        } else {
            entry.translated_text =
                merge::merge_singular(&entry.translated_text, job.status, machine_result);
        }
        entry.status = EntryStatus::Saved;

        Ok(Some(entry))
    }

    /// Overwrites the translation wholesale. The edit shape must match the entry.
    pub fn manual_edit(&mut self, index: usize, edit: ManualEdit) -> EngineResult<&Entry> {
        let entry = self.editable_entry(index)?;

        match (entry.is_plural, edit) {
            (false, ManualEdit::Singular(text)) => entry.translated_text = text,
            (true, ManualEdit::Plural(forms)) => entry.translated_plural = forms,
            (true, ManualEdit::Singular(text)) => {
                entry.translated_plural = PluralForms::from([(0, text)]);
            }
            (false, ManualEdit::Plural(_)) => {
                return Err(EngineError::Precondition(
                    "plural forms cannot be set on a singular entry",
                ));
            }
        }
        entry.status = EntryStatus::Saved;

        Ok(entry)
    }

    /// Applies editor text: parsed as `[n]: content` lines for plural entries,
    /// taken verbatim for singular ones.
    pub fn manual_edit_text(&mut self, index: usize, text: &str) -> EngineResult<&Entry> {
        let edit = if self.entry(index)?.is_plural {
            ManualEdit::Plural(merge::parse_plural_edit(text)?)
        } else {
            ManualEdit::Singular(text.to_string())
        };
        self.manual_edit(index, edit)
    }

    /// Accepts the entry as it is.
    pub fn mark_reviewed(&mut self, index: usize) -> EngineResult<&Entry> {
        let entry = self.editable_entry(index)?;
        entry.status = EntryStatus::Saved;
        Ok(entry)
    }

    /// Wholesale replacement, used by snapshot load.
    pub fn replace_entries(&mut self, entries: Vec<Entry>) {
        self.entries = entries;
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for e in &self.entries {
            match e.status {
                EntryStatus::New => counts.new += 1,
                EntryStatus::Modified => counts.modified += 1,
                EntryStatus::Normal => counts.normal += 1,
                EntryStatus::Deleted => counts.deleted += 1,
                EntryStatus::Saved => counts.saved += 1,
            }
        }
        counts
    }

    fn editable_entry(&mut self, index: usize) -> EngineResult<&mut Entry> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(EngineError::EntryIndex(index))?;

        if entry.is_deleted() {
            return Err(EngineError::EntryDeleted {
                key: entry.key.clone(),
            });
        }
        Ok(entry)
    }
}
