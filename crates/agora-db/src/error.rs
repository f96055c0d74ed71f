use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("backend returned no rows")]
    NoRows,

    #[error("delete without a filter")]
    Unfiltered,
}

impl DbError {
    /// Unique-constraint violation reported by the database.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { status: 409, .. })
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
