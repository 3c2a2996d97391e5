//! Filter-to-plan compilation and result merging.

use std::collections::HashSet;
use std::hash::Hash;

use chronicle_types::{canonical_order, Event, Filter, StoreError, ValidationError};

use crate::condition::{Column, Condition, Param, TagMatch, TagTest};

/// Knobs that shape compilation for a particular backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Bound for every resolved limit; also the limit of filters without one.
    pub max_limit: u32,
    /// Whether filters selecting nothing specific are compiled at all.
    pub allow_unbounded: bool,
    /// How tag tests of one filter combine.
    pub tag_match: TagMatch,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_limit: 1000,
            allow_unbounded: false,
            tag_match: TagMatch::AnyName,
        }
    }
}

impl CompileOptions {
    /// Resolves a filter's limit into `1..=max_limit`.
    pub fn resolve_limit(&self, limit: Option<u32>) -> u32 {
        let max = self.max_limit.max(1);
        match limit {
            Some(limit) if limit >= 1 => limit.min(max),
            _ => max,
        }
    }
}

/// The bounded plan for one filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Rows to select.
    pub condition: Condition,
    /// Maximum rows this plan contributes.
    pub limit: u32,
}

/// How plan results combine into the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// One plan; its ordered, bounded rows are the answer.
    Single,
    /// Several plans; union, dedup by id, sort canonically, truncate to `limit`.
    Union {
        /// Sum of per-plan limits.
        limit: usize,
    },
}

impl MergeStrategy {
    /// Upper bound on the number of merged events.
    pub fn limit(&self, plans: &[Plan]) -> usize {
        match self {
            Self::Single => plans.first().map_or(0, |plan| plan.limit as usize),
            Self::Union { limit } => *limit,
        }
    }
}

/// Output of [`compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// One plan per filter, in filter order.
    pub plans: Vec<Plan>,
    /// How to combine the plans' results.
    pub merge: MergeStrategy,
}

/// Output of [`compile_count`]: one condition per filter, summed.
///
/// The sum counts an event once per filter it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCount {
    /// One condition per filter, in filter order.
    pub conditions: Vec<Condition>,
}

/// Compiles filters into bounded query plans and a merge strategy.
///
/// # Errors
///
/// Returns [`StoreError::EmptyFilterList`] for an empty slice, and
/// [`ValidationError::EmptyFilter`] for a filter that selects nothing
/// specific unless `options.allow_unbounded` is set.
pub fn compile(filters: &[Filter], options: &CompileOptions) -> Result<CompiledQuery, StoreError> {
    if filters.is_empty() {
        return Err(StoreError::EmptyFilterList);
    }

    let plans = filters
        .iter()
        .map(|filter| compile_filter(filter, options))
        .collect::<Result<Vec<_>, _>>()?;

    let merge = if plans.len() == 1 {
        MergeStrategy::Single
    } else {
        MergeStrategy::Union {
            limit: plans.iter().map(|plan| plan.limit as usize).sum(),
        }
    };

    Ok(CompiledQuery { plans, merge })
}

/// Compiles filters into per-filter count conditions.
///
/// # Errors
///
/// Same as [`compile`].
pub fn compile_count(
    filters: &[Filter],
    options: &CompileOptions,
) -> Result<CompiledCount, StoreError> {
    let compiled = compile(filters, options)?;
    Ok(CompiledCount {
        conditions: compiled
            .plans
            .into_iter()
            .map(|plan| plan.condition)
            .collect(),
    })
}

/// Compiles a single filter into a bounded plan.
///
/// Fields combine conjunctively; values within a field are alternatives.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyFilter`] for an unbounded filter unless
/// `options.allow_unbounded` is set.
pub fn compile_filter(filter: &Filter, options: &CompileOptions) -> Result<Plan, StoreError> {
    if filter.is_unbounded() && !options.allow_unbounded {
        return Err(ValidationError::EmptyFilter.into());
    }

    let mut clauses = Vec::new();

    if !filter.ids.is_empty() {
        let ids = distinct(filter.ids.iter().cloned());
        clauses.push(Condition::membership(
            Column::Id,
            ids.into_iter().map(Param::Text).collect(),
        ));
    }

    if !filter.kinds.is_empty() {
        let kinds = distinct(filter.kinds.iter().copied());
        clauses.push(Condition::membership(
            Column::Kind,
            kinds
                .into_iter()
                .map(|kind| Param::Int(i64::from(kind.as_u16())))
                .collect(),
        ));
    }

    if !filter.authors.is_empty() {
        let authors = distinct(filter.authors.iter().cloned());
        clauses.push(Condition::membership(
            Column::Author,
            authors.into_iter().map(Param::Text).collect(),
        ));
    }

    if let Some(until) = filter.until {
        clauses.push(Condition::AtMost(Column::CreatedAt, until));
    }

    if let Some(since) = filter.since {
        clauses.push(Condition::AtLeast(Column::CreatedAt, since));
    }

    let tests: Vec<TagTest> = filter
        .tags
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| TagTest {
            name: name.clone(),
            values: distinct(values.iter().cloned()),
        })
        .collect();
    if !tests.is_empty() {
        clauses.push(Condition::Tags {
            mode: options.tag_match,
            tests,
        });
    }

    if let Some(term) = filter.search.as_deref().filter(|term| !term.is_empty()) {
        clauses.push(Condition::Search(term.to_string()));
    }

    Ok(Plan {
        condition: Condition::All(clauses),
        limit: options.resolve_limit(filter.limit),
    })
}

/// Unions result batches: dedup by id, canonical order, truncate.
pub fn merge_events<I>(batches: I, limit: usize) -> Vec<Event>
where
    I: IntoIterator<Item = Vec<Event>>,
{
    let mut seen = HashSet::new();
    let mut merged: Vec<Event> = batches
        .into_iter()
        .flatten()
        .filter(|event| seen.insert(event.id.clone()))
        .collect();
    merged.sort_by(canonical_order);
    merged.truncate(limit);
    merged
}

fn distinct<T, I>(values: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}
