use serde::Serialize;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::model::entry::{Entry, PluralForms};
use crate::model::record::ExportRecord;

/// Highest plural index that still maps to a `msgstr[n]` slot.
pub const MAX_PLURAL_INDEX: u32 = 63;

/// Every non-deleted entry, in entry-set order. Fails as a whole if any plural
/// entry carries an index that cannot be written.
pub fn export_candidates(entries: &[Entry]) -> EngineResult<Vec<ExportRecord>> {
    let records = entries
        .iter()
        .filter(|e| !e.is_deleted())
        .map(to_export_record)
        .collect::<EngineResult<Vec<_>>>()?;

    info!(count = records.len(), "export candidates selected");
    Ok(records)
}

fn to_export_record(entry: &Entry) -> EngineResult<ExportRecord> {
    if entry.is_plural {
        Ok(ExportRecord::Plural {
            key: entry.key.clone(),
            plural_key: entry.plural_key.clone(),
            forms: positional_forms(&entry.key, &entry.translated_plural)?,
        })
    } else {
        Ok(ExportRecord::Singular {
            key: entry.key.clone(),
            text: entry.translated_text.clone(),
        })
    }
}

/// Lays sparse plural forms out as `msgstr[0..=max]`, filling gaps with "".
/// An untranslated entry still gets its `msgstr[0]` slot.
fn positional_forms(key: &str, forms: &PluralForms) -> EngineResult<Vec<String>> {
    let Some((&max, _)) = forms.last_key_value() else {
        return Ok(vec![String::new()]);
    };

    if max > MAX_PLURAL_INDEX {
        return Err(EngineError::ExportCoercion {
            key: key.to_string(),
            index: max,
        });
    }

    Ok((0..=max)
        .map(|i| forms.get(&i).cloned().unwrap_or_default())
        .collect())
}

/// Row of the review table shown before writing.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ReviewRow {
    pub index: usize,
    pub id: String,
    pub kind: &'static str,
    pub source: String,
    pub translation: String,
}

pub fn review_rows(entries: &[Entry]) -> Vec<ReviewRow> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_deleted())
        .map(|(index, e)| ReviewRow {
            index,
            id: e.display_id(),
            kind: if e.is_plural { "Plural" } else { "Singular" },
            source: e.new_source_text.clone(),
            translation: e.translation_summary(),
        })
        .collect()
}
