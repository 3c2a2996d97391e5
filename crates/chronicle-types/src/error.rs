//! Error taxonomy shared by every backend.

use crate::event::{Event, Kind};

/// Boxed driver error carried inside [`StoreError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Input rejected before it reaches any engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Filter lists more ids than allowed.
    #[error("too many IDs in filter: max {max}, requested {requested}")]
    TooManyIds { max: usize, requested: usize },

    /// Filter lists more authors than allowed.
    #[error("too many authors in filter: max {max}, requested {requested}")]
    TooManyAuthors { max: usize, requested: usize },

    /// Filter lists more kinds than allowed.
    #[error("too many kinds in filter: max {max}, requested {requested}")]
    TooManyKinds { max: usize, requested: usize },

    /// Filter constrains more tag names than allowed.
    #[error("too many tags in filter: max {max}, requested {requested}")]
    TooManyTags { max: usize, requested: usize },

    /// Filter selects nothing specific.
    #[error("filter must specify at least one ID, kind, author, tag, or time range")]
    EmptyFilter,

    /// Event carries more tags than allowed.
    #[error("event {id} has too many tags: max {max}, found {found}")]
    EventTooManyTags { id: String, max: usize, found: usize },

    /// A single tag has more elements than allowed.
    #[error("event {id} has a tag with too many elements: max {max}, found {found}")]
    TagTooLong { id: String, max: usize, found: usize },

    /// Event content exceeds the size ceiling.
    #[error("event {id} content is too large: max {max} bytes, found {found}")]
    ContentTooLarge { id: String, max: usize, found: usize },
}

/// Every failure a store operation can report.
///
/// Variants distinguish the failure kind so callers can decide whether
/// to retry, reject input, or escalate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Malformed or oversized filter or event.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// `replace` called with a kind that is neither replaceable nor addressable.
    #[error("called replace on a non-replaceable event: event ID {id}, kind {kind}")]
    InvalidReplacement { id: String, kind: Kind },

    /// Query or count called without any filter.
    #[error("at least one filter is required")]
    EmptyFilterList,

    /// The engine stayed locked through every retry.
    #[error("database is locked: performed ({attempts}) attempts")]
    Busy { attempts: u32 },

    /// Connection, statement, or storage failure in the engine.
    #[error("{backend} engine error: {source}")]
    Engine {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    /// A stored row or record could not be decoded into an event.
    #[error("{backend} failed to decode stored event: {source}")]
    Decode {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    /// A query plan failed after other plans already produced events.
    #[error("query partially failed after collecting {} events: {source}", .events.len())]
    PartialQuery {
        events: Vec<Event>,
        #[source]
        source: Box<StoreError>,
    },

    /// At least one per-filter count failed; `count` sums the others.
    #[error("count partially failed with partial sum {count}: {source}")]
    PartialCount {
        count: u64,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Wraps a driver error as an engine failure.
    pub fn engine(backend: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Engine {
            backend,
            source: source.into(),
        }
    }

    /// Wraps a driver error as a decoding failure.
    pub fn decode(backend: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Decode {
            backend,
            source: source.into(),
        }
    }

    /// Whether retrying the same call later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Busy { .. } => true,
            Self::PartialQuery { source, .. } | Self::PartialCount { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }

    /// Whether the input itself was rejected.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidReplacement { .. } | Self::EmptyFilterList
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StoreError::Busy { attempts: 3 }.is_transient());
        assert!(!StoreError::Busy { attempts: 3 }.is_validation());
        assert!(StoreError::from(ValidationError::EmptyFilter).is_validation());
        assert!(StoreError::EmptyFilterList.is_validation());

        let engine = StoreError::engine("sqlite", "disk I/O error");
        assert!(!engine.is_transient());
        assert!(!engine.is_validation());

        let partial = StoreError::PartialCount {
            count: 4,
            source: Box::new(StoreError::Busy { attempts: 1 }),
        };
        assert!(partial.is_transient());
    }

    #[test]
    fn messages_carry_limits() {
        let err = ValidationError::TooManyIds {
            max: 100,
            requested: 101,
        };
        assert_eq!(err.to_string(), "too many IDs in filter: max 100, requested 101");

        let err = StoreError::InvalidReplacement {
            id: "abc".into(),
            kind: Kind(1),
        };
        assert!(err.to_string().contains("kind 1"));
    }
}
