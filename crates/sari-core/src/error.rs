use thiserror::Error;

#[derive(Debug, Error)]
pub enum SariError {
    #[error("merge conflict at '{path}': cannot merge a sub-tree with a value")]
    MergeConflict { path: String },

    #[error("{field} must be absent or a timezone-aware timestamp, got '{value}'")]
    NaiveTimestamp { field: String, value: String },

    #[error("{field}: invalid timestamp '{value}'")]
    InvalidTimestamp { field: String, value: String },

    #[error("'{not_valid_before}' should precede '{not_valid_after}'")]
    InvertedWindow {
        not_valid_before: String,
        not_valid_after: String,
    },

    #[error("undefined master_password")]
    UndefinedMasterPassword,

    #[error("invalid s3-prop reference: {0}")]
    InvalidSecretReference(String),

    #[error("invalid master password pattern '{pattern}': {reason}")]
    InvalidPasswordPattern { pattern: String, reason: String },

    #[error("invalid wildcard pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid boolean '{0}'")]
    InvalidFlag(String),

    #[error("{0}")]
    Collaborator(String),

    #[error("stage '{stage}' requires {missing} but no earlier stage produces it")]
    StageOrder { stage: String, missing: String },

    #[error("missing required setting: {0}")]
    MissingSetting(String),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error("config directory not found: {0}")]
    ConfigDirNotFound(String),

    #[error("worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SariError>;
