//! Catalog files in and out of the engine.
//!
//! Compiled `.mo` files go through our own reader, textual `.po`/`.pot` files
//! through `polib`. Export writes both the compiled and the textual form.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use polib::catalog::Catalog;
use polib::message::Message;
use polib::metadata::CatalogMetadata;
use polib::{mo_file, po_file};
use serde::Serialize;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::model::entry::PluralForms;
use crate::model::project::CatalogHeader;
use crate::model::record::{ExportRecord, RawRecord};
use crate::parsers::mo;
use crate::services::snapshot::tmp_path;

pub fn read(path: &Path) -> EngineResult<Vec<RawRecord>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let records = match ext.as_str() {
        "mo" | "gmo" => {
            let bytes = fs::read(path).map_err(|e| EngineError::io(path, e))?;
            mo::parse(&bytes).map_err(|msg| EngineError::parse(path, msg))?
        }
        "po" | "pot" => {
            if !path.exists() {
                return Err(EngineError::io(
                    path,
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
            let catalog = parse_po(path)?;
            records_from_catalog(&catalog)
        }
        _ => {
            return Err(EngineError::parse(
                path,
                "unsupported catalog type (expected .mo or .po)",
            ))
        }
    };

    info!(path = %path.display(), records = records.len(), "catalog read");
    Ok(records)
}

/// `polib` panics on a header missing one of its required keys instead of
/// returning an error.
fn parse_po(path: &Path) -> EngineResult<Catalog> {
    match panic::catch_unwind(AssertUnwindSafe(|| po_file::parse(path))) {
        Ok(parsed) => parsed.map_err(|e| EngineError::parse(path, e.to_string())),
        Err(_) => Err(EngineError::parse(
            path,
            "catalog header is missing required fields",
        )),
    }
}

fn records_from_catalog(catalog: &Catalog) -> Vec<RawRecord> {
    catalog
        .messages()
        .map(|m| {
            if m.is_plural() {
                RawRecord {
                    key: m.msgid().to_string(),
                    plural_key: m.msgid_plural().unwrap_or_default().to_string(),
                    singular_text: String::new(),
                    plural_texts: m
                        .msgstr_plural()
                        .map(|forms| {
                            forms
                                .iter()
                                .enumerate()
                                .map(|(i, s)| (i as u32, s.clone()))
                                .collect::<PluralForms>()
                        })
                        .unwrap_or_default(),
                }
            } else {
                RawRecord::singular(m.msgid(), m.msgstr().unwrap_or_default())
            }
        })
        .collect()
}

/// Where an export landed.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WrittenCatalog {
    pub compiled: PathBuf,
    pub text: PathBuf,
    pub count: usize,
}

/// Writes `records` as `<path>.mo` and `<path>.po` with the configured header.
pub fn write(path: &Path, records: &[ExportRecord], header: &CatalogHeader) -> EngineResult<WrittenCatalog> {
    let metadata = CatalogMetadata::parse(&header.to_metadata_text())
        .map_err(|e| EngineError::Settings(format!("catalog header: {e}")))?;

    let mut catalog = Catalog::new(metadata);
    for record in records {
        let message = match record {
            ExportRecord::Singular { key, text } => Message::build_singular()
                .with_msgid(key.clone())
                .with_msgstr(text.clone())
                .done(),
            ExportRecord::Plural {
                key,
                plural_key,
                forms,
            } => Message::build_plural()
                .with_msgid(key.clone())
                .with_msgid_plural(plural_key.clone())
                .with_msgstr_plural(forms.clone())
                .done(),
        };
        catalog.append_or_update(message);
    }

    let compiled = path.with_extension("mo");
    let text = path.with_extension("po");

    if let Some(parent) = compiled.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
    }

    // Both files are staged first so a failure leaves neither behind.
    let staged_mo = tmp_path(&compiled);
    let staged_po = tmp_path(&text);
    let staged = mo_file::write(&catalog, &staged_mo)
        .map_err(|e| EngineError::io(&staged_mo, e))
        .and_then(|_| po_file::write(&catalog, &staged_po).map_err(|e| EngineError::io(&staged_po, e)));
    if let Err(e) = staged {
        let _ = fs::remove_file(&staged_mo);
        let _ = fs::remove_file(&staged_po);
        return Err(e);
    }

    promote(&staged_mo, &compiled)?;
    promote(&staged_po, &text)?;

    info!(path = %compiled.display(), count = records.len(), "catalog exported");
    Ok(WrittenCatalog {
        compiled,
        text,
        count: records.len(),
    })
}

fn promote(staged: &Path, path: &Path) -> EngineResult<()> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| EngineError::io(path, e))?;
    }
    fs::rename(staged, path).map_err(|e| EngineError::io(path, e))
}
