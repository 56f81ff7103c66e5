use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Plural-form index -> text. Any index is allowed; 0 is the conventional default.
pub type PluralForms = BTreeMap<u32, String>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Entry {
    /// 1-based position in the new-source catalog; `None` for keys that only
    /// exist in the old catalogs.
    #[serde(default)]
    pub sequence_id: Option<u32>,

    pub key: String,

    #[serde(default)]
    pub is_plural: bool,

    #[serde(default)]
    pub plural_key: String,

    #[serde(default)]
    pub new_source_text: String,

    #[serde(default)]
    pub old_source_text: String,

    #[serde(default)]
    pub status: EntryStatus,

    #[serde(default)]
    pub translated_text: String,

    #[serde(default)]
    pub translated_plural: PluralForms,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    New,
    Modified,
    Normal,
    Deleted,
    Saved,
}

impl Default for EntryStatus {
    fn default() -> Self {
        EntryStatus::New
    }
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::New => "New",
            EntryStatus::Modified => "Modified",
            EntryStatus::Normal => "Normal",
            EntryStatus::Deleted => "Deleted",
            EntryStatus::Saved => "Saved",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Entry {
    pub fn is_deleted(&self) -> bool {
        self.status == EntryStatus::Deleted
    }

    /// True when the translation field selected by `is_plural` carries text.
    pub fn has_translation(&self) -> bool {
        if self.is_plural {
            !self.translated_plural.is_empty()
        } else {
            !self.translated_text.is_empty()
        }
    }

    /// Text sent to the translation backend. Falls back to the key when the
    /// new-source field was left blank.
    pub fn translation_source(&self) -> &str {
        if self.new_source_text.is_empty() {
            &self.key
        } else {
            &self.new_source_text
        }
    }

    /// Identifier shown in host tables: the sequence number, or `DEL` for removed keys.
    pub fn display_id(&self) -> String {
        let mut id = match self.sequence_id {
            Some(seq) => seq.to_string(),
            None => "DEL".to_string(),
        };
        if self.is_plural {
            id.push_str(" (PL)");
        }
        id
    }

    pub fn translation_summary(&self) -> String {
        if self.is_plural {
            self.translated_plural
                .iter()
                .map(|(k, v)| format!("[{k}]{v}"))
                .collect::<Vec<_>>()
                .join("; ")
        } else {
            self.translated_text.clone()
        }
    }
}
