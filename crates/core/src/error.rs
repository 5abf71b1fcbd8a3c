#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize JSON: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("record schema mismatch at {path}: {message}")]
    YamlDeserialization { path: String, message: String },

    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("background task failed: {0}")]
    Task(String),

    #[error("identifier error: {0}")]
    Uuid(#[from] portal_uuid::UuidError),
    #[error("text error: {0}")]
    Text(#[from] portal_types::TextError),
    #[error("document storage error: {0}")]
    Files(#[from] portal_files::FilesError),
}

impl PortalError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        PortalError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PortalError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type PortalResult<T> = std::result::Result<T, PortalError>;
