#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    LoadNewSource,
    LoadOldSource,
    LoadOldTranslation,
    ListEntries,
    GetEntry,
    EditEntry,
    AcceptEntry,
    TranslateStart,
    TranslateCancel,
    TranslateStatus,
    ValidateCredentials,
    ProjectSave,
    ProjectLoad,
    ExportPreview,
    ExportWrite,
    Unknown,
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s {
            "ping" => Command::Ping,
            "catalog.load_new" => Command::LoadNewSource,
            "catalog.load_old_source" => Command::LoadOldSource,
            "catalog.load_old_translation" => Command::LoadOldTranslation,
            "entries.list" => Command::ListEntries,
            "entry.get" => Command::GetEntry,
            "entry.edit" => Command::EditEntry,
            "entry.accept" => Command::AcceptEntry,
            "translate.start" => Command::TranslateStart,
            "translate.cancel" => Command::TranslateCancel,
            "translate.status" => Command::TranslateStatus,
            "credentials.validate" => Command::ValidateCredentials,
            "project.save" => Command::ProjectSave,
            "project.load" => Command::ProjectLoad,
            "export.preview" => Command::ExportPreview,
            "export.write" => Command::ExportWrite,
            _ => Command::Unknown,
        }
    }
}
