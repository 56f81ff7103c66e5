//! Shapes the host renders: table rows and the selected-entry panel.

use serde::Serialize;

use crate::model::entry::{Entry, EntryStatus};
use crate::services::merge;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EntryRow {
    pub index: usize,
    pub id: String,
    pub new_source: String,
    pub old_source: String,
    pub status: EntryStatus,
    pub translation: String,
    pub action: &'static str,
}

/// Rows for the main table. `Normal` entries need no work and are hidden
/// unless asked for.
pub fn entry_rows(entries: &[Entry], include_normal: bool) -> Vec<EntryRow> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| include_normal || e.status != EntryStatus::Normal)
        .map(|(index, e)| EntryRow {
            index,
            id: e.display_id(),
            new_source: e.new_source_text.clone(),
            old_source: e.old_source_text.clone(),
            status: e.status,
            translation: e.translation_summary(),
            action: match e.status {
                EntryStatus::New | EntryStatus::Modified => "TBD",
                _ => "",
            },
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct EntryDetail<'a> {
    pub index: usize,
    pub entry: &'a Entry,
    pub source_display: String,
    pub editable: bool,
    /// Prefilled editor content.
    pub edit_text: String,
}

pub fn entry_detail(index: usize, entry: &Entry) -> EntryDetail<'_> {
    let source_display = if entry.is_plural {
        format!(
            "[Plural ID] {}\n[Singular Source] {}",
            entry.plural_key, entry.new_source_text
        )
    } else {
        entry.new_source_text.clone()
    };

    let edit_text = if entry.is_plural {
        merge::format_plural_edit(&entry.translated_plural)
    } else {
        entry.translated_text.clone()
    };

    EntryDetail {
        index,
        entry,
        source_display,
        editable: !entry.is_deleted(),
        edit_text,
    }
}
