//! Query compilation and the replacement protocol for chronicle stores.
//!
//! The compiler turns declarative [`Filter`](chronicle_types::Filter) sets
//! into a backend-neutral [`Condition`] tree plus a [`MergeStrategy`].
//! Backends render the tree themselves: [`sql`] produces parameterised
//! statements for a relational engine, and [`Condition::matches`] evaluates
//! it in memory.
//!
//! # Multi-filter semantics
//!
//! Query results are the union of every filter's bounded matches,
//! deduplicated by id, ordered newest first (ties by ascending id) and
//! truncated to the sum of the filters' limits. Counts are summed per
//! filter and are *not* deduplicated: an event matching two filters is
//! counted twice.

mod compile;
mod condition;
mod predicate;
pub mod replace;
pub mod sql;

pub use compile::{
    compile, compile_count, compile_filter, merge_events, CompileOptions, CompiledCount,
    CompiledQuery, MergeStrategy, Plan,
};
pub use condition::{Column, Condition, Param, TagMatch, TagTest};
pub use replace::{apply, replaceable_address, Incumbent, ReplaceOutcome, ReplaceScope};
