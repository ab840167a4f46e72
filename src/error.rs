use thiserror::Error;

/// Failures talking to the external creature catalog.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("catalog request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("catalog response from {url} could not be decoded")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog worker failed: {0}")]
    Task(String),
}

/// A storage operation failed. Wraps whatever the store reported.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct PersistenceError(#[from] anyhow::Error);

#[derive(Debug, Error)]
pub enum DeckError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("category '{0}' is not in the category vocabulary")]
    CategoryNotFound(String),
}

impl From<anyhow::Error> for DeckError {
    fn from(err: anyhow::Error) -> Self {
        DeckError::Persistence(PersistenceError(err))
    }
}

pub type DeckResult<T> = Result<T, DeckError>;
