use serde::Serialize;
use thiserror::Error;

use crate::models::media::FormatKind;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum QueryError {
    #[error("no data")]
    NoData,
    #[error("coordinator unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum DispatchError {
    #[error("{kind} format not found: {itag}")]
    FormatNotFound { kind: FormatKind, itag: String },

    /// The stream only carries a ciphered locator.
    #[error("no download URL available for {kind} format {itag}")]
    MissingUrl { kind: FormatKind, itag: String },

    /// The download service refused the submission; message kept verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("download already in progress for this format")]
    AlreadyPending,

    #[error("coordinator unavailable")]
    Unavailable,
}
