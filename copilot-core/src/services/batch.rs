//! Background machine translation.
//!
//! A batch is a worker thread that walks a fixed list of jobs one request at a
//! time, pausing between requests, and reports through a channel. The receiver
//! applies each result to the engine as it arrives, so results land in
//! submission order and one entry at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::EngineResult;
use crate::services::backend::{backend_message, TranslationBackend};
use crate::services::engine::{Engine, TranslationJob};

/// Prefix marking machine output for review.
pub const AI_MARKER: &str = "[AI] ";
pub const ERROR_MARKER: &str = "[API Error] ";

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub source_lang: String,
    pub target_lang: String,
    pub request_delay: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub translated: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Log(String),
    Result {
        job: TranslationJob,
        /// Machine text or an error-tagged message; merged the same way.
        text: String,
        failed: bool,
    },
    Finished(BatchSummary),
}

pub struct BatchHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    /// Asks the worker to stop before its next job. The request in flight completes.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    pub fn join(self) -> BatchSummary {
        self.thread.join().unwrap_or_default()
    }
}

pub fn spawn(
    jobs: Vec<TranslationJob>,
    backend: Arc<dyn TranslationBackend>,
    cfg: BatchConfig,
    events: Sender<BatchEvent>,
) -> BatchHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);

    let thread = thread::spawn(move || run(&jobs, backend.as_ref(), &cfg, &flag, &events));

    BatchHandle { cancel, thread }
}

fn run(
    jobs: &[TranslationJob],
    backend: &dyn TranslationBackend,
    cfg: &BatchConfig,
    cancel: &AtomicBool,
    events: &Sender<BatchEvent>,
) -> BatchSummary {
    let mut summary = BatchSummary::default();

    let log = |msg: String| {
        info!(target: "batch", "{msg}");
        let _ = events.send(BatchEvent::Log(msg));
    };

    log(format!(
        ">>> Translation Started... ({} entries, {})",
        jobs.len(),
        backend.name()
    ));

    for (i, job) in jobs.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            summary.cancelled = true;
            break;
        }

        let (text, failed) =
            match backend.translate(&job.source_text, &cfg.source_lang, &cfg.target_lang) {
                Ok(raw) if raw.is_empty() => (raw, false),
                Ok(raw) => (format!("{AI_MARKER}{raw}"), false),
                Err(e) => {
                    let msg = backend_message(&e);
                    warn!(key = %job.key, error = %msg, "translation request failed");
                    log(format!("API Error: {msg}"));
                    (format!("{ERROR_MARKER}{msg}"), true)
                }
            };

        if failed {
            summary.failed += 1;
        } else {
            summary.translated += 1;
        }

        let sent = events.send(BatchEvent::Result {
            job: job.clone(),
            text,
            failed,
        });
        if sent.is_err() {
            // Nobody is listening anymore.
            summary.cancelled = true;
            break;
        }

        if i + 1 < jobs.len() {
            pause(cfg.request_delay, cancel);
        }
    }

    log(if summary.cancelled {
        ">>> Translation Cancelled.".to_string()
    } else {
        ">>> Translation Completed.".to_string()
    });
    let _ = events.send(BatchEvent::Finished(summary));

    summary
}

/// Sleeps for `delay`, waking early once cancellation is requested.
fn pause(delay: Duration, cancel: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while !cancel.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}

/// Applies one result and returns the operator log line for it, or `None` when
/// the operator saved the entry while the batch was running.
pub fn apply_result(engine: &mut Engine, job: &TranslationJob, text: &str) -> EngineResult<Option<String>> {
    let Some(entry) = engine.apply_translation_result(job, text)? else {
        return Ok(None);
    };
    let id = entry.display_id();

    Ok(Some(if entry.is_plural {
        let form0 = entry.translated_plural.get(&0).map(String::as_str).unwrap_or("");
        format!("Translation (Plural) [{id}]: Append/Set -> {form0}")
    } else {
        format!("Translation (Singular) [{id}]: Append/Set -> {}", entry.translated_text)
    }))
}
