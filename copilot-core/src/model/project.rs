use serde::{Deserialize, Serialize};

fn default_project_id() -> String {
    "Mir Korabley".to_string()
}

fn default_translator() -> String {
    "DDF_FantasyV".to_string()
}

fn default_team() -> String {
    "<REPAD Localization Team>".to_string()
}

fn default_language() -> String {
    "zh_SG".to_string()
}

fn default_plural_forms() -> String {
    "nplurals=1; plural=0;".to_string()
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

fn default_source_language() -> String {
    "Russian".to_string()
}

fn default_target_language() -> String {
    "Simplified Chinese (for Game Localization)".to_string()
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

/// Metadata header written into every exported catalog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogHeader {
    #[serde(default = "default_project_id")]
    pub project_id: String,

    #[serde(default = "default_translator")]
    pub translator: String,

    #[serde(default = "default_team")]
    pub team: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_plural_forms")]
    pub plural_forms: String,

    #[serde(default = "default_encoding")]
    pub encoding: String,
}

impl Default for CatalogHeader {
    fn default() -> Self {
        CatalogHeader {
            project_id: default_project_id(),
            translator: default_translator(),
            team: default_team(),
            language: default_language(),
            plural_forms: default_plural_forms(),
            encoding: default_encoding(),
        }
    }
}

impl CatalogHeader {
    /// Renders the header as the msgstr of the empty msgid. Every standard key is
    /// present, even when empty, since `polib` requires them.
    pub fn to_metadata_text(&self) -> String {
        format!(
            "Project-Id-Version: {}\n\
             POT-Creation-Date: \n\
             PO-Revision-Date: \n\
             Last-Translator: {}\n\
             Language-Team: {}\n\
             Language: {}\n\
             MIME-Version: 1.0\n\
             Content-Type: text/plain; charset={}\n\
             Content-Transfer-Encoding: 8bit\n\
             Plural-Forms: {}\n",
            self.project_id,
            self.translator,
            self.team,
            self.language,
            self.encoding,
            self.plural_forms
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: String,

    /// Pause after every request, to stay under the provider's rate limit.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub header: CatalogHeader,

    #[serde(default = "default_source_language", alias = "source_lang")]
    pub source_language: String,

    #[serde(default = "default_target_language", alias = "target_lang")]
    pub target_language: String,

    #[serde(default)]
    pub backend: BackendSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            header: CatalogHeader::default(),
            source_language: default_source_language(),
            target_language: default_target_language(),
            backend: BackendSettings::default(),
        }
    }
}
