//! Declarative event filters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::{Kind, Timestamp};

/// Tag constraints: tag name to accepted values.
///
/// Values under one name are OR-ed, distinct names are AND-ed.
pub type TagMap = BTreeMap<String, Vec<String>>;

/// A declarative predicate selecting events.
///
/// Within `ids`, `authors` and `kinds` the values are alternatives; the
/// fields themselves combine conjunctively. A call that takes several
/// filters returns the union of their matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Accepted event ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    /// Accepted authors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Accepted kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<Kind>,
    /// Tag constraints.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: TagMap,
    /// Inclusive lower bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Timestamp>,
    /// Inclusive upper bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<Timestamp>,
    /// Maximum number of results. `Some(0)` asks for no stored events at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Free-text search over content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Filter {
    /// Creates a filter with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds accepted ids.
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Adds accepted authors.
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors.extend(authors.into_iter().map(Into::into));
        self
    }

    /// Adds accepted kinds.
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.kinds.extend(kinds.into_iter().map(Kind));
        self
    }

    /// Adds accepted values for the tag `name`.
    pub fn tag<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags
            .entry(name.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Sets the inclusive lower time bound.
    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Sets the inclusive upper time bound.
    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Sets the result limit.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the free-text search term.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Whether the filter selects nothing specific, so that running it
    /// would scan the whole store.
    pub fn is_unbounded(&self) -> bool {
        self.ids.is_empty()
            && self.authors.is_empty()
            && self.kinds.is_empty()
            && self.tags.values().all(Vec::is_empty)
            && self.since.is_none()
            && self.until.is_none()
    }

    /// Whether the caller explicitly asked for zero stored results.
    pub fn is_zero_result(&self) -> bool {
        self.limit == Some(0)
    }

    /// Number of tag names that carry at least one value.
    pub fn tag_count(&self) -> usize {
        self.tags.values().filter(|values| !values.is_empty()).count()
    }
}

/// Drops filters that express zero-result intent.
pub fn remove_zeros(filters: Vec<Filter>) -> Vec<Filter> {
    filters
        .into_iter()
        .filter(|filter| !filter.is_zero_result())
        .collect()
}
