use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to load {fixture}: {source}")]
    FixtureRead {
        fixture: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {fixture}: {source}")]
    FixtureParse {
        fixture: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("load cancelled")]
    Cancelled,

    #[error("Selected response not found: {0}")]
    ResponseNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
