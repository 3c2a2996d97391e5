//! Backend-neutral condition tree produced by the compiler.
//!
//! Values live inline in the tree. Each backend renders the tree on its own
//! terms: the `sql` module emits text with a parallel parameter list, the
//! `predicate` module evaluates it against an event in memory.

/// Event fields a condition can test directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// `id`
    Id,
    /// `pubkey`
    Author,
    /// `kind`
    Kind,
    /// `created_at`
    CreatedAt,
}

/// A value bound to a condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    /// Text value.
    Text(String),
    /// Integer value.
    Int(i64),
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// How the tag tests of a single filter combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMatch {
    /// At least one constrained tag name must match; rendered as a single
    /// existence test over the tag association relation.
    #[default]
    AnyName,
    /// Every constrained tag name must match; rendered as one existence
    /// test per name.
    AllNames,
}

/// One tag-name test: the event carries tag `name` with one of `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTest {
    /// Tag name.
    pub name: String,
    /// Accepted values (non-empty).
    pub values: Vec<String>,
}

/// A node of the condition tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Conjunction. An empty conjunction is always true.
    All(Vec<Condition>),
    /// Disjunction. An empty disjunction is always false.
    Any(Vec<Condition>),
    /// Column equals a single value.
    Eq(Column, Param),
    /// Column is one of several values.
    In(Column, Vec<Param>),
    /// Column is greater than or equal to the bound.
    AtLeast(Column, i64),
    /// Column is less than or equal to the bound.
    AtMost(Column, i64),
    /// Tag constraints of one filter, combined per `mode`.
    Tags {
        /// Combination across tag names.
        mode: TagMatch,
        /// One test per constrained tag name.
        tests: Vec<TagTest>,
    },
    /// Case-insensitive substring search over content.
    Search(String),
}

impl Condition {
    /// The condition that matches every event.
    pub fn always() -> Self {
        Self::All(Vec::new())
    }

    /// Whether this node is trivially true.
    pub fn is_always(&self) -> bool {
        matches!(self, Self::All(children) if children.iter().all(Condition::is_always))
    }

    /// Equality for one value, membership for several.
    pub fn membership(column: Column, mut values: Vec<Param>) -> Self {
        if values.len() == 1 {
            Self::Eq(column, values.remove(0))
        } else {
            Self::In(column, values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_picks_equality_for_one_value() {
        assert_eq!(
            Condition::membership(Column::Id, vec![Param::from("a")]),
            Condition::Eq(Column::Id, Param::from("a"))
        );
        assert!(matches!(
            Condition::membership(Column::Id, vec![Param::from("a"), Param::from("b")]),
            Condition::In(Column::Id, _)
        ));
    }

    #[test]
    fn always_detection() {
        assert!(Condition::always().is_always());
        assert!(Condition::All(vec![Condition::always()]).is_always());
        assert!(!Condition::Search("x".into()).is_always());
        assert!(!Condition::Any(Vec::new()).is_always());
    }
}
