//! In-memory rendering of the condition tree.

use chronicle_types::Event;

use crate::compile::Plan;
use crate::condition::{Column, Condition, Param, TagMatch, TagTest};

impl Condition {
    /// Evaluates the condition against `event`.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::All(children) => children.iter().all(|child| child.matches(event)),
            Self::Any(children) => children.iter().any(|child| child.matches(event)),
            Self::Eq(column, value) => column_equals(event, *column, value),
            Self::In(column, values) => values
                .iter()
                .any(|value| column_equals(event, *column, value)),
            Self::AtLeast(column, bound) => {
                integer_column(event, *column).is_some_and(|v| v >= *bound)
            }
            Self::AtMost(column, bound) => {
                integer_column(event, *column).is_some_and(|v| v <= *bound)
            }
            Self::Tags { mode, tests } => match mode {
                TagMatch::AllNames => tests.iter().all(|test| test.matches(event)),
                TagMatch::AnyName => tests.iter().any(|test| test.matches(event)),
            },
            Self::Search(term) => contains_ignore_case(&event.content, term),
        }
    }
}

impl TagTest {
    /// Whether `event` carries tag `name` with an accepted value.
    pub fn matches(&self, event: &Event) -> bool {
        event
            .tag_values(&self.name)
            .any(|value| self.values.iter().any(|accepted| accepted == value))
    }
}

impl Plan {
    /// Evaluates the plan's condition against `event`.
    pub fn matches(&self, event: &Event) -> bool {
        self.condition.matches(event)
    }
}

fn column_equals(event: &Event, column: Column, value: &Param) -> bool {
    match (column, value) {
        (Column::Id, Param::Text(text)) => event.id == *text,
        (Column::Author, Param::Text(text)) => event.author == *text,
        (Column::Kind | Column::CreatedAt, Param::Int(n)) => {
            integer_column(event, column) == Some(*n)
        }
        _ => false,
    }
}

fn integer_column(event: &Event, column: Column) -> Option<i64> {
    match column {
        Column::Kind => Some(i64::from(event.kind.as_u16())),
        Column::CreatedAt => Some(event.created_at),
        Column::Id | Column::Author => None,
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
