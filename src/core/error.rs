use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpoolTagError {
    #[error("Invalid tag UID: {0}")]
    InvalidUid(String),

    #[error("Decrypted block map is empty or the scan did not succeed")]
    DataAbsent,

    #[error("Block {block} missing or malformed: {reason}")]
    FieldExtraction { block: u8, reason: String },

    #[error("Tag data does not match the {0} layout")]
    FormatMismatch(&'static str),

    #[error("Required identifier missing: {0}")]
    MissingIdentifier(&'static str),

    #[error("Cache entry corrupted for key {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("Key-value store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(#[from] validator::ValidationErrors),
}

pub type Result<T> = std::result::Result<T, SpoolTagError>;
