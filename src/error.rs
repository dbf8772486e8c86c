use crate::store::Revision;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid query string: {0}")]
    InvalidQuery(#[from] serde_urlencoded::de::Error),

    #[error("query string could not be serialized: {0}")]
    Serialize(#[from] serde_urlencoded::ser::Error),

    /// The store changed between reading `expected` and attempting to replace it.
    #[error("stale revision: expected {expected}, store is at {actual}")]
    StaleRevision { expected: Revision, actual: Revision },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
