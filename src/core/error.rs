use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Disk I/O error: {0}")]
    DiskIO(#[from] std::io::Error),

    #[error("Malformed bulk payload at line {line}: {reason}")]
    MalformedBulk { line: usize, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Serialization error for {kind}: {reason}")]
    Serialization { kind: &'static str, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
