//! How a machine-translation result is combined with the text an entry already has,
//! and the `[index]: content` text form used for editing plural translations.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{EngineError, EngineResult};
use crate::model::entry::{Entry, EntryStatus, PluralForms};

/// Modified entries keep their previous translation and get the new result
/// appended on its own line, unless it is already there.
pub fn merge_singular(old_translated_text: &str, status: EntryStatus, machine_result: &str) -> String {
    if status == EntryStatus::Modified && !old_translated_text.is_empty() {
        if old_translated_text.contains(machine_result) {
            old_translated_text.to_string()
        } else {
            format!("{old_translated_text}\n{machine_result}")
        }
    } else {
        machine_result.to_string()
    }
}

/// Same policy on form 0. Only form 0 survives.
pub fn merge_plural(old_plural: &PluralForms, status: EntryStatus, machine_result: &str) -> PluralForms {
    let old_text = old_plural.get(&0).map(String::as_str).unwrap_or("");
    let mut merged = PluralForms::new();
    merged.insert(0, merge_singular(old_text, status, machine_result));
    merged
}

/// Whether a batch run should send this entry to the backend.
pub fn qualifies_for_translation(entry: &Entry) -> bool {
    match entry.status {
        EntryStatus::New => !entry.has_translation(),
        EntryStatus::Modified => true,
        _ => false,
    }
}

fn plural_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\d+)\]:\s*(.*)$").expect("static regex"))
}

/// Parses editor text into plural forms. Lines without an `[n]:` prefix are
/// stored as form 0; blank lines are skipped.
pub fn parse_plural_edit(text: &str) -> EngineResult<PluralForms> {
    let mut forms = PluralForms::new();

    for line in text.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match plural_line_re().captures(line) {
            Some(caps) => {
                let index: u32 = caps[1].parse().map_err(|_| EngineError::InvalidPluralEdit {
                    line: line.to_string(),
                })?;
                forms.insert(index, caps[2].to_string());
            }
            None => {
                forms.insert(0, line.to_string());
            }
        }
    }

    Ok(forms)
}

/// Inverse of [`parse_plural_edit`], used to prefill the editor.
pub fn format_plural_edit(forms: &PluralForms) -> String {
    if forms.is_empty() {
        return "[0]: ".to_string();
    }

    forms
        .iter()
        .map(|(k, v)| format!("[{k}]: {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}
