use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::project::Settings;
use crate::services::backend::{HttpBackend, TranslationBackend};
use crate::services::batch::{self, BatchConfig, BatchEvent, BatchHandle, BatchSummary};
use crate::services::engine::Engine;
use crate::services::{catalog, export, settings, snapshot};

mod command;
mod view;

use command::Command;

/// Where response and event lines go. Shared with the batch applier thread.
pub type Outbox = Arc<Mutex<dyn Write + Send>>;

fn get_cmd(req: &Value) -> &str {
    req.get("cmd").and_then(|v| v.as_str()).unwrap_or("")
}

fn get_id(req: &Value) -> Value {
    req.get("id").cloned().unwrap_or(Value::Null)
}

fn get_payload(req: &Value) -> &Value {
    static EMPTY: Value = Value::Null;
    req.get("payload").unwrap_or(&EMPTY)
}

fn ok(id: Value, payload: Value) -> String {
    json!({
        "id": id,
        "status": "ok",
        "payload": payload
    })
    .to_string()
}

fn err(id: Value, message: impl Into<String>) -> String {
    json!({
        "id": id,
        "status": "error",
        "message": message.into()
    })
    .to_string()
}

fn required_str<'a>(payload: &'a Value, field: &'static str) -> EngineResult<&'a str> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(EngineError::MissingField(field))
}

fn required_index(payload: &Value) -> EngineResult<usize> {
    payload
        .get("index")
        .and_then(|v| v.as_u64())
        .map(|i| i as usize)
        .ok_or(EngineError::MissingField("index"))
}

fn lock(engine: &Mutex<Engine>) -> MutexGuard<'_, Engine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn emit(out: &Outbox, line: &str) {
    if let Ok(mut w) = out.lock() {
        let _ = writeln!(w, "{line}");
        let _ = w.flush();
    }
}

struct RunningBatch {
    handle: BatchHandle,
    applier: JoinHandle<()>,
}

impl RunningBatch {
    fn is_running(&self) -> bool {
        self.handle.is_running() || !self.applier.is_finished()
    }

    fn finish(self) -> BatchSummary {
        let summary = self.handle.join();
        let _ = self.applier.join();
        summary
    }
}

pub struct Session {
    engine: Arc<Mutex<Engine>>,
    settings: Settings,
    config_dir: PathBuf,
    backend: Option<Arc<dyn TranslationBackend>>,
    batch: Option<RunningBatch>,
    out: Outbox,
}

impl Session {
    pub fn new(settings: Settings, config_dir: PathBuf, out: Outbox) -> Self {
        Session {
            engine: Arc::new(Mutex::new(Engine::new())),
            settings,
            config_dir,
            backend: None,
            batch: None,
            out,
        }
    }

    /// Uses `backend` instead of the HTTP provider from the settings.
    pub fn with_backend(mut self, backend: Arc<dyn TranslationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn handle(&mut self, input: &str) -> String {
        let req: Value = match serde_json::from_str(input) {
            Ok(v) => v,
            Err(_) => {
                return json!({
                    "status": "error",
                    "message": "invalid json"
                })
                .to_string();
            }
        };

        let id = get_id(&req);
        let cmd_str = get_cmd(&req);
        let payload = get_payload(&req);

        let result = match Command::from(cmd_str) {
            Command::Ping => Ok(json!({ "message": "copilot-core alive" })),
            Command::LoadNewSource => self.load_new_source(payload),
            Command::LoadOldSource => self.load_old_source(payload),
            Command::LoadOldTranslation => self.load_old_translation(payload),
            Command::ListEntries => {
                let include_normal = payload
                    .get("include_normal")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let engine = lock(&self.engine);
                Ok(json!({ "rows": view::entry_rows(engine.entries(), include_normal) }))
            }
            Command::GetEntry => self.get_entry(payload),
            Command::EditEntry => self.edit_entry(payload),
            Command::AcceptEntry => self.accept_entry(payload),
            Command::TranslateStart => self.start_translation(),
            Command::TranslateCancel => Ok(self.cancel_translation()),
            Command::TranslateStatus => Ok(json!({ "running": self.batch_running() })),
            Command::ValidateCredentials => self.validate_credentials(payload),
            Command::ProjectSave => self.save_project(payload),
            Command::ProjectLoad => self.load_project(payload),
            Command::ExportPreview => {
                let engine = lock(&self.engine);
                Ok(json!({ "rows": export::review_rows(engine.entries()) }))
            }
            Command::ExportWrite => self.export(payload),
            Command::Unknown => return err(id, "unknown command"),
        };

        match result {
            Ok(payload) => ok(id, payload),
            Err(e) => {
                warn!(cmd = cmd_str, error = %e, "command failed");
                err(id, e.to_string())
            }
        }
    }

    fn batch_running(&self) -> bool {
        self.batch.as_ref().is_some_and(RunningBatch::is_running)
    }

    fn ensure_idle(&self) -> EngineResult<()> {
        if self.batch_running() {
            return Err(EngineError::Precondition("a translation batch is running"));
        }
        Ok(())
    }

    fn load_new_source(&mut self, payload: &Value) -> EngineResult<Value> {
        self.ensure_idle()?;
        let path = required_str(payload, "path")?;
        let records = catalog::read(Path::new(path))?;

        let count = lock(&self.engine).ingest_new_source(records);
        Ok(json!({ "count": count }))
    }

    fn load_old_source(&mut self, payload: &Value) -> EngineResult<Value> {
        self.ensure_idle()?;
        if !lock(&self.engine).is_loaded() {
            return Err(EngineError::Precondition("load the new source catalog first"));
        }
        let path = required_str(payload, "path")?;
        let records = catalog::read(Path::new(path))?;

        let mut engine = lock(&self.engine);
        let saved = engine.status_counts().saved;
        if saved > 0 {
            warn!(saved, "re-comparing against old source discards Saved statuses");
        }
        let counts = engine.align_old_source(records)?;
        Ok(json!({ "counts": counts }))
    }

    fn load_old_translation(&mut self, payload: &Value) -> EngineResult<Value> {
        self.ensure_idle()?;
        if !lock(&self.engine).is_loaded() {
            return Err(EngineError::Precondition("load the new source catalog first"));
        }
        let path = required_str(payload, "path")?;
        let records = catalog::read(Path::new(path))?;

        let paired = lock(&self.engine).align_old_translation(records)?;
        Ok(json!({ "paired": paired }))
    }

    fn get_entry(&self, payload: &Value) -> EngineResult<Value> {
        let index = required_index(payload)?;
        let engine = lock(&self.engine);
        let entry = engine.entry(index)?;
        Ok(json!(view::entry_detail(index, entry)))
    }

    fn edit_entry(&mut self, payload: &Value) -> EngineResult<Value> {
        let index = required_index(payload)?;
        let text = payload
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or(EngineError::MissingField("text"))?;

        let mut engine = lock(&self.engine);
        let entry = engine.manual_edit_text(index, text)?;
        Ok(json!({ "entry": entry }))
    }

    fn accept_entry(&mut self, payload: &Value) -> EngineResult<Value> {
        let index = required_index(payload)?;
        let mut engine = lock(&self.engine);
        let entry = engine.mark_reviewed(index)?;
        Ok(json!({ "entry": entry }))
    }

    fn backend_for(&self, api_key: Option<&str>) -> EngineResult<Arc<dyn TranslationBackend>> {
        if let Some(backend) = &self.backend {
            return Ok(Arc::clone(backend));
        }

        let mut cfg = self.settings.backend.clone();
        if let Some(key) = api_key {
            cfg.api_key = key.to_string();
        }
        if cfg.api_key.trim().is_empty() {
            return Err(EngineError::Precondition(
                "no API key configured; validate one with credentials.validate",
            ));
        }
        Ok(Arc::new(HttpBackend::new(&cfg)?))
    }

    fn start_translation(&mut self) -> EngineResult<Value> {
        self.ensure_idle()?;
        if let Some(done) = self.batch.take() {
            done.finish();
        }

        let jobs = lock(&self.engine).translation_jobs();
        if jobs.is_empty() {
            info!("nothing to translate");
            return Ok(json!({ "queued": 0 }));
        }

        let backend = self.backend_for(None)?;
        let cfg = BatchConfig {
            source_lang: self.settings.source_language.clone(),
            target_lang: self.settings.target_language.clone(),
            request_delay: Duration::from_millis(self.settings.backend.request_delay_ms),
        };

        let queued = jobs.len();
        let (tx, rx) = mpsc::channel();
        let handle = batch::spawn(jobs, backend, cfg, tx);
        let applier = spawn_applier(rx, Arc::clone(&self.engine), Arc::clone(&self.out));

        self.batch = Some(RunningBatch { handle, applier });
        Ok(json!({ "queued": queued }))
    }

    fn cancel_translation(&mut self) -> Value {
        match &self.batch {
            Some(b) if b.is_running() => {
                b.handle.cancel();
                json!({ "cancelling": true })
            }
            _ => json!({ "cancelling": false }),
        }
    }

    /// Cancels a running batch and waits for it to wind down.
    pub fn shutdown(&mut self) -> Option<BatchSummary> {
        let running = self.batch.take()?;
        running.handle.cancel();
        Some(running.finish())
    }

    /// Waits for the current batch to finish on its own.
    pub fn wait_for_batch(&mut self) -> Option<BatchSummary> {
        self.batch.take().map(RunningBatch::finish)
    }

    fn validate_credentials(&mut self, payload: &Value) -> EngineResult<Value> {
        let api_key = required_str(payload, "api_key")?.trim().to_string();
        let backend = self.backend_for(Some(&api_key))?;

        info!(provider = backend.name(), "verifying API key");
        let (valid, message) = backend.validate_credentials(&api_key);

        if valid {
            settings::remember_api_key(&self.config_dir, &mut self.settings, &api_key)?;
        }
        Ok(json!({ "valid": valid, "message": message }))
    }

    fn save_project(&self, payload: &Value) -> EngineResult<Value> {
        let path = required_str(payload, "path")?;
        let engine = lock(&self.engine);
        snapshot::save_to_file(Path::new(path), engine.entries())?;
        Ok(json!({ "count": engine.entries().len() }))
    }

    fn load_project(&mut self, payload: &Value) -> EngineResult<Value> {
        self.ensure_idle()?;
        let path = required_str(payload, "path")?;
        let entries = snapshot::load_from_file(Path::new(path))?;

        let count = entries.len();
        lock(&self.engine).replace_entries(entries);
        Ok(json!({ "count": count }))
    }

    fn export(&self, payload: &Value) -> EngineResult<Value> {
        let path = required_str(payload, "path")?;
        let records = {
            let engine = lock(&self.engine);
            export::export_candidates(engine.entries())?
        };
        let written = catalog::write(Path::new(path), &records, &self.settings.header)?;
        Ok(json!(written))
    }
}

fn spawn_applier(rx: Receiver<BatchEvent>, engine: Arc<Mutex<Engine>>, out: Outbox) -> JoinHandle<()> {
    thread::spawn(move || {
        for event in rx {
            let line = match event {
                BatchEvent::Log(message) => json!({ "event": "log", "message": message }),
                BatchEvent::Result { job, text, .. } => {
                    let mut engine = lock(&engine);
                    match batch::apply_result(&mut engine, &job, &text) {
                        Ok(Some(log_line)) => {
                            info!(target: "batch", "{log_line}");
                            emit(&out, &json!({ "event": "log", "message": log_line }).to_string());
                            json!({
                                "event": "translation",
                                "index": job.index,
                                "key": job.key,
                                "entry": engine.entries().get(job.index),
                            })
                        }
                        Ok(None) => json!({
                            "event": "log",
                            "message": format!("Skipped [{}]: edited during batch", job.key),
                        }),
                        Err(e) => {
                            error!(key = %job.key, error = %e, "could not apply translation");
                            json!({ "event": "log", "message": format!("Error: {e}") })
                        }
                    }
                }
                BatchEvent::Finished(summary) => json!({
                    "event": "translation_finished",
                    "translated": summary.translated,
                    "failed": summary.failed,
                    "cancelled": summary.cancelled,
                }),
            };
            emit(&out, &line.to_string());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::mo::tests::build;
    use crate::services::mock::{MockBackend, MockMode};
    use pretty_assertions::assert_eq;
    use std::fs;

    struct Harness {
        session: Session,
        sink: Arc<Mutex<Vec<u8>>>,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(mode: MockMode) -> Self {
            Self::with(Arc::new(MockBackend::new(mode)))
        }

        fn with(backend: Arc<dyn TranslationBackend>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let sink = Arc::new(Mutex::new(Vec::new()));
            let out: Outbox = sink.clone();

            let mut settings = Settings::default();
            settings.backend.request_delay_ms = 0;
            settings.target_language = "zh".into();

            let session = Session::new(settings, dir.path().to_path_buf(), out)
                .with_backend(backend);
            Harness { session, sink, dir }
        }

        fn call(&mut self, cmd: &str, payload: Value) -> Value {
            let line = json!({ "id": 1, "cmd": cmd, "payload": payload }).to_string();
            serde_json::from_str(&self.session.handle(&line)).unwrap()
        }

        fn write_mo(&self, name: &str, pairs: &[(&[u8], &[u8])]) -> String {
            let path = self.dir.path().join(name);
            fs::write(&path, build(pairs, false)).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn events(&self) -> Vec<Value> {
            let raw = self.sink.lock().unwrap().clone();
            String::from_utf8(raw)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    fn load_pair(h: &mut Harness) {
        let new = h.write_mo(
            "new.mo",
            &[
                (&b"HELLO"[..], "Привет".as_bytes()),
                (&b"BYE"[..], "Пока".as_bytes()),
                (&b"FLEET"[..], "Флот!".as_bytes()),
            ],
        );
        let old = h.write_mo(
            "old.mo",
            &[
                (&b"BYE"[..], "Пока".as_bytes()),
                (&b"FLEET"[..], "Флот".as_bytes()),
                (&b"GONE"[..], "Нет".as_bytes()),
            ],
        );

        let resp = h.call("catalog.load_new", json!({ "path": new }));
        assert_eq!(resp["payload"]["count"], 3);
        let resp = h.call("catalog.load_old_source", json!({ "path": old }));
        assert_eq!(resp["status"], "ok");
        assert_eq!(resp["payload"]["counts"]["deleted"], 1);
        assert_eq!(resp["payload"]["counts"]["modified"], 1);
    }

    #[test]
    fn ping_and_unknown() {
        let mut h = Harness::new(MockMode::Suffix);
        assert_eq!(h.call("ping", Value::Null)["status"], "ok");

        let resp = h.call("nope", Value::Null);
        assert_eq!(resp["status"], "error");
        assert_eq!(resp["message"], "unknown command");

        let resp: Value = serde_json::from_str(&h.session.handle("{ not json")).unwrap();
        assert_eq!(resp["message"], "invalid json");
    }

    #[test]
    fn old_source_requires_new_source() {
        let mut h = Harness::new(MockMode::Suffix);
        let old = h.write_mo("old.mo", &[(&b"A"[..], &b"a"[..])]);
        let resp = h.call("catalog.load_old_source", json!({ "path": old }));
        assert_eq!(resp["status"], "error");
    }

    #[test]
    fn listing_hides_normal_entries() {
        let mut h = Harness::new(MockMode::Suffix);
        load_pair(&mut h);

        let rows = h.call("entries.list", json!({}))["payload"]["rows"].clone();
        let ids: Vec<_> = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "3", "DEL"]);

        let all = h.call("entries.list", json!({ "include_normal": true }));
        assert_eq!(all["payload"]["rows"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn batch_translates_and_streams_events() {
        let mut h = Harness::new(MockMode::Suffix);
        load_pair(&mut h);

        let resp = h.call("translate.start", Value::Null);
        assert_eq!(resp["payload"]["queued"], 2);
        let summary = h.session.wait_for_batch().unwrap();
        assert_eq!(summary.translated, 2);
        assert!(!summary.cancelled);

        let events = h.events();
        let translated: Vec<_> = events
            .iter()
            .filter(|e| e["event"] == "translation")
            .map(|e| e["entry"]["translated_text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(translated, vec!["[AI] Привет_zh", "[AI] Флот!_zh"]);
        assert_eq!(
            events.last().unwrap()["event"],
            "translation_finished"
        );

        let detail = h.call("entry.get", json!({ "index": 0 }));
        assert_eq!(detail["payload"]["entry"]["status"], "Saved");
    }

    #[test]
    fn failed_requests_are_recorded_as_text() {
        let mut h = Harness::new(MockMode::Error("quota".into()));
        load_pair(&mut h);

        h.call("translate.start", Value::Null);
        let summary = h.session.wait_for_batch().unwrap();
        assert_eq!(summary.failed, 2);

        let detail = h.call("entry.get", json!({ "index": 0 }));
        assert_eq!(detail["payload"]["entry"]["translated_text"], "[API Error] quota");
    }

    /// Holds every request until the test lets it through.
    struct GatedBackend {
        gate: Mutex<Receiver<()>>,
    }

    impl TranslationBackend for GatedBackend {
        fn translate(&self, text: &str, _source_lang: &str, target_lang: &str) -> EngineResult<String> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(format!("{text}_{target_lang}"))
        }

        fn validate_credentials(&self, _api_key: &str) -> (bool, String) {
            (true, "API Key is valid".into())
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    #[test]
    fn edit_during_batch_is_not_overwritten() {
        let (open, gate) = mpsc::channel();
        let mut h = Harness::with(Arc::new(GatedBackend {
            gate: Mutex::new(gate),
        }));
        load_pair(&mut h);

        assert_eq!(h.call("translate.start", Value::Null)["payload"]["queued"], 2);
        let resp = h.call("entry.edit", json!({ "index": 0, "text": "你好" }));
        assert_eq!(resp["status"], "ok");

        open.send(()).unwrap();
        open.send(()).unwrap();
        h.session.wait_for_batch().unwrap();

        let detail = h.call("entry.get", json!({ "index": 0 }));
        assert_eq!(detail["payload"]["entry"]["translated_text"], "你好");
        let detail = h.call("entry.get", json!({ "index": 2 }));
        assert_eq!(detail["payload"]["entry"]["translated_text"], "[AI] Флот!_zh");

        let events = h.events();
        assert!(events
            .iter()
            .any(|e| e["message"] == "Skipped [HELLO]: edited during batch"));
        let translated: Vec<_> = events
            .iter()
            .filter(|e| e["event"] == "translation")
            .map(|e| e["key"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(translated, vec!["FLEET"]);
    }

    #[test]
    fn edit_accept_and_deleted_entries() {
        let mut h = Harness::new(MockMode::Suffix);
        load_pair(&mut h);

        let resp = h.call("entry.edit", json!({ "index": 0, "text": "你好" }));
        assert_eq!(resp["payload"]["entry"]["translated_text"], "你好");
        assert_eq!(resp["payload"]["entry"]["status"], "Saved");

        let resp = h.call("entry.accept", json!({ "index": 3 }));
        assert_eq!(resp["status"], "error");

        let resp = h.call("entry.edit", json!({ "index": 42, "text": "x" }));
        assert_eq!(resp["status"], "error");
    }

    #[test]
    fn project_round_trip_and_export() {
        let mut h = Harness::new(MockMode::Suffix);
        load_pair(&mut h);
        h.call("entry.edit", json!({ "index": 0, "text": "你好" }));

        let snap = h.dir.path().join("work.json");
        let resp = h.call("project.save", json!({ "path": snap }));
        assert_eq!(resp["payload"]["count"], 4);

        let mut other = Harness::new(MockMode::Suffix);
        let resp = other.call("project.load", json!({ "path": snap }));
        assert_eq!(resp["payload"]["count"], 4);

        let preview = other.call("export.preview", Value::Null);
        assert_eq!(preview["payload"]["rows"].as_array().unwrap().len(), 3);

        let target = other.dir.path().join("out").join("zh");
        let resp = other.call("export.write", json!({ "path": target }));
        assert_eq!(resp["status"], "ok");
        assert_eq!(resp["payload"]["count"], 3);
        assert!(target.with_extension("mo").exists());
        assert!(target.with_extension("po").exists());
    }

    #[test]
    fn credentials_are_checked_and_stored() {
        let mut h = Harness::new(MockMode::Suffix);
        let resp = h.call("credentials.validate", json!({ "api_key": "bad" }));
        assert_eq!(resp["payload"]["valid"], false);
        assert!(!settings::settings_path(h.dir.path()).exists());

        let resp = h.call("credentials.validate", json!({ "api_key": " good-key " }));
        assert_eq!(resp["payload"]["valid"], true);
        assert!(settings::settings_path(h.dir.path()).exists());
    }

    #[test]
    fn empty_entry_set_queues_nothing() {
        let mut h = Harness::new(MockMode::Suffix);
        let resp = h.call("translate.start", Value::Null);
        assert_eq!(resp["payload"]["queued"], 0);
        assert_eq!(h.call("translate.status", Value::Null)["payload"]["running"], false);
        assert_eq!(h.call("translate.cancel", Value::Null)["payload"]["cancelling"], false);
    }
}
