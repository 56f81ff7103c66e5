use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::project::Settings;
use crate::services::snapshot::write_atomic;

const SETTINGS_FILE: &str = "settings.json";

/// `$COPILOT_HOME`, else `%LOCALAPPDATA%/PoeditCopilot`, else `./PoeditCopilot`.
pub fn config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("COPILOT_HOME") {
        if !home.trim().is_empty() {
            return PathBuf::from(home);
        }
    }
    if let Ok(local) = std::env::var("LOCALAPPDATA") {
        return PathBuf::from(local).join("PoeditCopilot");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("PoeditCopilot")
}

pub fn settings_path(dir: &Path) -> PathBuf {
    dir.join(SETTINGS_FILE)
}

/// Reads settings from `dir`. A missing file yields defaults.
pub fn load(dir: &Path) -> EngineResult<Settings> {
    let path = settings_path(dir);

    let mut settings = if path.exists() {
        let data = fs::read_to_string(&path).map_err(|e| EngineError::io(&path, e))?;
        serde_json::from_str::<Settings>(&data)
            .map_err(|e| EngineError::Settings(format!("{}: {e}", path.display())))?
    } else {
        info!(path = %path.display(), "no settings file, using defaults");
        Settings::default()
    };

    apply_env(&mut settings, std::env::var("COPILOT_API_KEY").ok());
    Ok(settings)
}

fn apply_env(settings: &mut Settings, api_key: Option<String>) {
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        settings.backend.api_key = key.trim().to_string();
    }
}

pub fn save(dir: &Path, settings: &Settings) -> EngineResult<()> {
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| EngineError::Settings(format!("failed to serialize settings: {e}")))?;
    write_atomic(&settings_path(dir), json.as_bytes())
}

/// Stores a key that passed validation.
pub fn remember_api_key(dir: &Path, settings: &mut Settings, api_key: &str) -> EngineResult<()> {
    settings.backend.api_key = api_key.trim().to_string();
    if let Err(e) = save(dir, settings) {
        warn!(error = %e, "failed to persist API key");
        return Err(e);
    }
    info!("API key verified and saved");
    Ok(())
}
