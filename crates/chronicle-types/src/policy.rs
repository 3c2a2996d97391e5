//! Pluggable validation policies injected into stores at construction.
//!
//! An [`EventPolicy`] vets events before they are written; a
//! [`FilterPolicy`] sanitizes filters before they are compiled. Stores call
//! these capabilities but never implement them.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::Event;
use crate::filter::{remove_zeros, Filter};

/// Pre-write validation of events.
pub trait EventPolicy: Send + Sync {
    /// Rejects events that must not be stored.
    ///
    /// # Errors
    ///
    /// Returns the reason the event was rejected.
    fn validate(&self, event: &Event) -> Result<(), ValidationError>;
}

/// Pre-read sanitization of filters.
pub trait FilterPolicy: Send + Sync {
    /// Returns the filters to execute, possibly clamped or reduced.
    ///
    /// Implementations drop zero-result-intent filters and may reject the
    /// whole set.
    ///
    /// # Errors
    ///
    /// Returns the reason the filter set was rejected.
    fn sanitize(&self, filters: Vec<Filter>) -> Result<Vec<Filter>, ValidationError>;

    /// Whether filters that select nothing specific may be executed.
    fn allows_unbounded(&self) -> bool {
        false
    }
}

/// Permissive policy: accepts every event and every non-zero filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl EventPolicy for AcceptAll {
    fn validate(&self, _event: &Event) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl FilterPolicy for AcceptAll {
    fn sanitize(&self, filters: Vec<Filter>) -> Result<Vec<Filter>, ValidationError> {
        Ok(remove_zeros(filters))
    }

    fn allows_unbounded(&self) -> bool {
        true
    }
}

/// Protects an engine from queries that are too expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    /// Maximum ids per filter.
    pub max_ids: usize,
    /// Maximum kinds per filter.
    pub max_kinds: usize,
    /// Maximum authors per filter.
    pub max_authors: usize,
    /// Maximum tag names per filter.
    pub max_tags: usize,
    /// Upper bound for a filter's limit; also the default limit.
    pub max_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_ids: 100,
            max_kinds: 10,
            max_authors: 100,
            max_tags: 5,
            max_limit: 1000,
        }
    }
}

impl QueryLimits {
    /// Checks one filter against the limits and resolves its limit.
    ///
    /// A missing, zero or oversized limit becomes `max_limit`.
    ///
    /// # Errors
    ///
    /// Returns the first limit the filter breaks, or
    /// [`ValidationError::EmptyFilter`] if it selects nothing specific.
    pub fn validate(&self, filter: &mut Filter) -> Result<(), ValidationError> {
        if filter.ids.len() > self.max_ids {
            return Err(ValidationError::TooManyIds {
                max: self.max_ids,
                requested: filter.ids.len(),
            });
        }
        if filter.kinds.len() > self.max_kinds {
            return Err(ValidationError::TooManyKinds {
                max: self.max_kinds,
                requested: filter.kinds.len(),
            });
        }
        if filter.authors.len() > self.max_authors {
            return Err(ValidationError::TooManyAuthors {
                max: self.max_authors,
                requested: filter.authors.len(),
            });
        }
        let tags = filter.tag_count();
        if tags > self.max_tags {
            return Err(ValidationError::TooManyTags {
                max: self.max_tags,
                requested: tags,
            });
        }
        if filter.is_unbounded() {
            return Err(ValidationError::EmptyFilter);
        }

        filter.limit = match filter.limit {
            Some(limit) if limit >= 1 && limit <= self.max_limit => Some(limit),
            _ => Some(self.max_limit),
        };
        Ok(())
    }
}

impl FilterPolicy for QueryLimits {
    fn sanitize(&self, filters: Vec<Filter>) -> Result<Vec<Filter>, ValidationError> {
        let mut filters = remove_zeros(filters);
        for filter in &mut filters {
            self.validate(filter)?;
        }
        Ok(filters)
    }
}

/// Protects an engine from events that are too large.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteLimits {
    /// Maximum number of tags per event.
    pub max_tags: usize,
    /// Maximum number of elements in a single tag.
    pub max_tag_len: usize,
    /// Maximum content size in bytes.
    pub max_content_bytes: usize,
}

impl Default for WriteLimits {
    fn default() -> Self {
        Self {
            max_tags: 1000,
            max_tag_len: 100,
            max_content_bytes: 64 * 1024,
        }
    }
}

impl EventPolicy for WriteLimits {
    fn validate(&self, event: &Event) -> Result<(), ValidationError> {
        if event.tags.len() > self.max_tags {
            return Err(ValidationError::EventTooManyTags {
                id: event.id.clone(),
                max: self.max_tags,
                found: event.tags.len(),
            });
        }
        if let Some(longest) = event.tags.iter().map(Vec::len).max() {
            if longest > self.max_tag_len {
                return Err(ValidationError::TagTooLong {
                    id: event.id.clone(),
                    max: self.max_tag_len,
                    found: longest,
                });
            }
        }
        if event.content.len() > self.max_content_bytes {
            return Err(ValidationError::ContentTooLarge {
                id: event.id.clone(),
                max: self.max_content_bytes,
                found: event.content.len(),
            });
        }
        Ok(())
    }
}
