#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("required config key {0:?} is missing")]
    MissingKey(String),
    #[error("config key {path:?} has the wrong type, expected {expected}")]
    WrongType { path: String, expected: &'static str },
    #[error("config key {0:?} does not name a table")]
    NotATable(String),
    #[error("{0} unused config key(s) remain in strict mode: {1:?}")]
    UnusedKeys(usize, Vec<String>),
}
