use serde::Serialize;

use crate::model::entry::PluralForms;

/// One message as read from a catalog file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub key: String,
    /// Empty for singular messages.
    pub plural_key: String,
    pub singular_text: String,
    pub plural_texts: PluralForms,
}

impl RawRecord {
    pub fn singular(key: impl Into<String>, text: impl Into<String>) -> Self {
        RawRecord {
            key: key.into(),
            singular_text: text.into(),
            ..Default::default()
        }
    }

    pub fn plural(key: impl Into<String>, plural_key: impl Into<String>, forms: &[&str]) -> Self {
        RawRecord {
            key: key.into(),
            plural_key: plural_key.into(),
            singular_text: String::new(),
            plural_texts: forms
                .iter()
                .enumerate()
                .map(|(i, s)| (i as u32, s.to_string()))
                .collect(),
        }
    }

    pub fn is_plural(&self) -> bool {
        !self.plural_key.is_empty()
    }

    /// The field compared across catalogs: form 0 for plurals, else the singular text.
    pub fn primary_text(&self, plural: bool) -> &str {
        if plural {
            self.plural_texts.get(&0).map(String::as_str).unwrap_or("")
        } else {
            &self.singular_text
        }
    }
}

/// One message handed to the catalog writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportRecord {
    Singular {
        key: String,
        text: String,
    },
    Plural {
        key: String,
        plural_key: String,
        /// Positional `msgstr[n]` values.
        forms: Vec<String>,
    },
}

impl ExportRecord {
    pub fn key(&self) -> &str {
        match self {
            ExportRecord::Singular { key, .. } | ExportRecord::Plural { key, .. } => key,
        }
    }
}
