//! Shared types for the chronicle event stores.
//!
//! This crate defines the [`Event`] record and its identity categories, the
//! declarative [`Filter`], the pluggable validation policies, the
//! [`StoreError`] taxonomy, and the [`Store`] contract that every backend
//! implements. Backends depend on this crate and on nothing else for
//! cross-cutting definitions.

mod error;
mod event;
mod filter;
mod policy;
mod store;

pub use error::{BoxError, StoreError, ValidationError};
pub use event::{canonical_order, Address, Category, Event, Kind, Tag, Timestamp};
pub use filter::{remove_zeros, Filter, TagMap};
pub use policy::{AcceptAll, EventPolicy, FilterPolicy, QueryLimits, WriteLimits};
pub use store::Store;
