use std::fmt;

use thiserror::Error;

/// Pipeline stage, used to tag fatal errors and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Index,
    Match,
    Filter,
    Personalize,
    Collect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Index => "index",
            Stage::Match => "match",
            Stage::Filter => "filter",
            Stage::Personalize => "personalize",
            Stage::Collect => "collect",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A corpus record or criterion failed validation. `position` is the
    /// zero-based record position, `id` the identifier when one was present.
    #[error("Invalid record at position {position}{}: {reason}", id_suffix(.id))]
    Validation {
        position: usize,
        id: Option<String>,
        reason: String,
    },

    #[error("Similarity index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Similarity query failed: {0}")]
    Query(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    /// Transport-level failure talking to a provider.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Run cancelled before {stage} stage")]
    Cancelled { stage: Stage },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn id_suffix(id: &Option<String>) -> String {
    id.as_deref().map(|i| format!(" (id {i})")).unwrap_or_default()
}

impl Error {
    /// Wrap `self` with the stage it surfaced in. Already-tagged errors and
    /// cancellations are returned unchanged.
    #[must_use]
    pub fn at(self, stage: Stage) -> Self {
        match self {
            Error::Stage { .. } | Error::Cancelled { .. } => self,
            other => Error::Stage { stage, source: Box::new(other) },
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited { .. } | Error::Timeout(_) | Error::Network(_))
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } | Error::Cancelled { stage } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_position_and_id() {
        let e = Error::Validation { position: 3, id: Some("abc".into()), reason: "missing text body".into() };
        assert_eq!(e.to_string(), "Invalid record at position 3 (id abc): missing text body");
        let e = Error::Validation { position: 0, id: None, reason: "missing record_uuid".into() };
        assert_eq!(e.to_string(), "Invalid record at position 0: missing record_uuid");
    }

    #[test]
    fn at_tags_once() {
        let e = Error::IndexUnavailable("disk".into()).at(Stage::Index).at(Stage::Match);
        assert_eq!(e.stage(), Some(Stage::Index));
        assert_eq!(e.to_string(), "index stage failed: Similarity index unavailable: disk");
    }
}
