//! Pause/resume support: the full entry set serialized into a versioned,
//! checksummed blob.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::model::entry::Entry;

const FORMAT: &str = "copilot-snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    format: &'a str,
    version: u32,
    checksum: String,
    entries: &'a [Entry],
}

#[derive(Deserialize)]
struct EnvelopeIn {
    format: String,
    version: u32,
    checksum: String,
    entries: Vec<Entry>,
}

fn checksum(entries: &[Entry]) -> EngineResult<String> {
    let body = serde_json::to_vec(entries).map_err(|e| EngineError::Snapshot(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&body);
    Ok(hex::encode(hasher.finalize()))
}

pub fn save(entries: &[Entry]) -> EngineResult<Vec<u8>> {
    let envelope = EnvelopeOut {
        format: FORMAT,
        version: SNAPSHOT_VERSION,
        checksum: checksum(entries)?,
        entries,
    };
    serde_json::to_vec(&envelope).map_err(|e| EngineError::Snapshot(e.to_string()))
}

pub fn load(blob: &[u8]) -> EngineResult<Vec<Entry>> {
    let envelope: EnvelopeIn =
        serde_json::from_slice(blob).map_err(|e| EngineError::Snapshot(e.to_string()))?;

    if envelope.format != FORMAT {
        return Err(EngineError::Snapshot(format!(
            "not a project snapshot (format \"{}\")",
            envelope.format
        )));
    }

    if envelope.version != SNAPSHOT_VERSION {
        return Err(EngineError::Snapshot(format!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            envelope.version
        )));
    }

    if checksum(&envelope.entries)? != envelope.checksum {
        return Err(EngineError::Snapshot("checksum mismatch".into()));
    }

    Ok(envelope.entries)
}

pub fn save_to_file(path: &Path, entries: &[Entry]) -> EngineResult<()> {
    let blob = save(entries)?;
    write_atomic(path, &blob)?;
    info!(path = %path.display(), entries = entries.len(), "project saved");
    Ok(())
}

pub fn load_from_file(path: &Path) -> EngineResult<Vec<Entry>> {
    let blob = fs::read(path).map_err(|e| EngineError::io(path, e))?;
    let entries = load(&blob)?;
    info!(path = %path.display(), entries = entries.len(), "project loaded");
    Ok(entries)
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> EngineResult<()> {
    let tmp = tmp_path(path);

    if let Some(parent) = tmp.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
    }

    fs::write(&tmp, bytes).map_err(|e| EngineError::io(&tmp, e))?;

    if path.exists() {
        fs::remove_file(path).map_err(|e| EngineError::io(path, e))?;
    }

    fs::rename(&tmp, path).map_err(|e| EngineError::io(path, e))?;

    Ok(())
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(n) => n.to_string(),
        None => "progress".to_string(),
    };
    p.set_file_name(format!("{file_name}.part"));
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::EntryStatus;
    use crate::model::record::RawRecord;
    use crate::services::engine::Engine;
    use pretty_assertions::assert_eq;

    fn worked_engine() -> Engine {
        let mut engine = Engine::new();
        engine.ingest_new_source(vec![
            RawRecord::singular("A", "a"),
            RawRecord::singular("B", "b new"),
            RawRecord::plural("ship", "ships", &["корабль", "корабля"]),
            RawRecord::plural("gun", "guns", &["пушка", "пушки"]),
        ]);
        engine
            .align_old_source(vec![
                RawRecord::singular("B", "b old"),
                RawRecord::plural("gun", "guns", &["орудие"]),
                RawRecord::plural("gone", "gones", &["x"]),
            ])
            .unwrap();
        engine
            .align_old_translation(vec![
                RawRecord::singular("B", "乙\n"),
                RawRecord::plural("gun", "guns", &["炮旧", "炮们"]),
            ])
            .unwrap();

        for job in engine.translation_jobs() {
            if job.key == "B" || job.key == "gun" {
                let result = format!("[AI] {}", job.source_text);
                engine.apply_translation_result(&job, &result).unwrap();
            }
        }
        engine.manual_edit_text(2, "[0]: 船\n[5]: 五").unwrap();
        engine
    }

    #[test]
    fn round_trip_is_exact() {
        let engine = worked_engine();
        let gun = &engine.entries()[3];
        assert_eq!(
            gun.translated_plural.get(&0).map(String::as_str),
            Some("炮旧\n[AI] пушка")
        );
        assert_eq!(engine.entries()[1].status, EntryStatus::Saved);
        assert_eq!(engine.entries()[0].status, EntryStatus::New);

        let blob = save(engine.entries()).unwrap();
        assert_eq!(load(&blob).unwrap(), engine.entries());
    }

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("progress.tmp");
        let engine = worked_engine();

        save_to_file(&path, engine.entries()).unwrap();
        save_to_file(&path, engine.entries()).unwrap();

        assert_eq!(load_from_file(&path).unwrap(), engine.entries());
        assert!(!dir.path().join("nested").join("progress.tmp.part").exists());
    }

    #[test]
    fn rejects_other_versions() {
        let blob = save(worked_engine().entries()).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&blob).unwrap();
        value["version"] = serde_json::json!(SNAPSHOT_VERSION + 1);
        let blob = serde_json::to_vec(&value).unwrap();

        assert!(matches!(load(&blob), Err(EngineError::Snapshot(_))));
    }

    #[test]
    fn rejects_tampered_entries() {
        let blob = save(worked_engine().entries()).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&blob).unwrap();
        value["entries"][0]["status"] = serde_json::json!("Saved");
        let blob = serde_json::to_vec(&value).unwrap();

        match load(&blob) {
            Err(EngineError::Snapshot(msg)) => assert_eq!(msg, "checksum mismatch"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(load(b"\x80\x03pickle"), Err(EngineError::Snapshot(_))));
        assert!(matches!(
            load(br#"{"format":"other","version":1,"checksum":"","entries":[]}"#),
            Err(EngineError::Snapshot(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_file(&dir.path().join("missing.tmp")).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
