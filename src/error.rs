use thiserror::Error;

/// Failure to turn one feed source into raw items.
///
/// These are per-source: the trigger skips the source and carries on with
/// the others.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The text could not be parsed as XML even after sanitization.
    #[error("malformed feed: {0}")]
    Malformed(String),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// A raw item that could not be mapped into a job record.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("invalid item: {0}")]
    InvalidItem(String),
}

/// Persistence failure in the job or import log store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Broker failure at enqueue, claim or acknowledgement time.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown delivery: task {0}")]
    UnknownDelivery(i64),
}

/// Any failure a worker can hit while processing one item.
///
/// Only ever surfaces as a counter and a reason string in the import log.
#[derive(Debug, Error)]
pub enum ItemFailure {
    #[error(transparent)]
    Mapping(#[from] ItemError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
