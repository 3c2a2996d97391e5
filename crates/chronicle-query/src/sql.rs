//! Relational rendering of compiled plans.
//!
//! Rendering produces SQL text with positional `?` placeholders and a
//! parallel list of bound parameters, in placeholder order. Nothing from a
//! filter is ever interpolated into the text.
//!
//! The expected schema is an `events` table (`id`, `pubkey`, `created_at`,
//! `kind`, `tags`, `content`, `sig`) and an `event_tags` association table
//! (`event_id`, `name`, `value`).

use crate::compile::{CompiledCount, CompiledQuery, MergeStrategy, Plan};
use crate::condition::{Column, Condition, Param, TagMatch, TagTest};

/// Columns selected for every event row, in decoding order.
pub const EVENT_COLUMNS: &str = "e.id AS id, e.pubkey AS pubkey, e.created_at AS created_at, \
     e.kind AS kind, e.tags AS tags, e.content AS content, e.sig AS sig";

const ORDER: &str = "ORDER BY e.created_at DESC, e.id ASC";

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    /// Statement text with `?` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<Param>,
}

impl std::fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.sql, self.params)
    }
}

/// Renders a compiled query into a single statement.
///
/// One plan renders as an ordered, limited select. Several plans render as
/// a `UNION` of bounded sub-selects, re-ordered and truncated to the merge
/// limit; `UNION` drops rows selected by more than one plan.
pub fn render_query(compiled: &CompiledQuery) -> SqlQuery {
    let mut params = Vec::new();

    let sql = match compiled.merge {
        MergeStrategy::Single => match compiled.plans.first() {
            Some(plan) => bounded_select(plan, &mut params),
            None => String::from("SELECT * FROM events WHERE 0"),
        },
        MergeStrategy::Union { limit } => {
            let branches: Vec<String> = compiled
                .plans
                .iter()
                .map(|plan| format!("SELECT * FROM ({})", bounded_select(plan, &mut params)))
                .collect();
            params.push(Param::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
            format!(
                "SELECT id, pubkey, created_at, kind, tags, content, sig FROM ({}) \
                 ORDER BY created_at DESC, id ASC LIMIT ?",
                branches.join(" UNION ")
            )
        }
    };

    SqlQuery { sql, params }
}

/// Renders a count into a single scalar statement summing every filter.
pub fn render_count(compiled: &CompiledCount) -> SqlQuery {
    let mut params = Vec::new();
    let counts: Vec<String> = compiled
        .conditions
        .iter()
        .map(|condition| count_select(condition, &mut params))
        .collect();

    let sql = match counts.len() {
        0 => String::from("SELECT 0"),
        1 => counts.into_iter().next().unwrap_or_default(),
        _ => format!(
            "SELECT {}",
            counts
                .iter()
                .map(|count| format!("({count})"))
                .collect::<Vec<_>>()
                .join(" + ")
        ),
    };

    SqlQuery { sql, params }
}

/// Renders a single plan as a standalone select, for per-filter execution.
pub fn render_plan(plan: &Plan) -> SqlQuery {
    let mut params = Vec::new();
    let sql = bounded_select(plan, &mut params);
    SqlQuery { sql, params }
}

/// Renders a condition as a `WHERE` body, or `None` when it is always true.
pub fn render_condition(condition: &Condition, params: &mut Vec<Param>) -> Option<String> {
    match condition {
        Condition::All(children) => {
            let parts: Vec<String> = children
                .iter()
                .filter_map(|child| render_condition(child, params))
                .collect();
            match parts.len() {
                0 => None,
                1 => parts.into_iter().next(),
                _ => Some(parts.join(" AND ")),
            }
        }
        Condition::Any(children) => {
            // Rendered into a scratch list: an always-true child short-circuits
            // the whole disjunction and none of its siblings' params may leak.
            let mut scratch = Vec::new();
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                match render_condition(child, &mut scratch) {
                    Some(part) => parts.push(format!("({part})")),
                    None => return Some(String::from("1")),
                }
            }
            params.append(&mut scratch);
            if parts.is_empty() {
                Some(String::from("0"))
            } else {
                Some(format!("({})", parts.join(" OR ")))
            }
        }
        Condition::Eq(column, value) => {
            params.push(value.clone());
            Some(format!("{} = ?", column_name(*column)))
        }
        Condition::In(column, values) => {
            params.extend(values.iter().cloned());
            Some(format!("{}{}", column_name(*column), membership_clause(values.len())))
        }
        Condition::AtLeast(column, bound) => {
            params.push(Param::Int(*bound));
            Some(format!("{} >= ?", column_name(*column)))
        }
        Condition::AtMost(column, bound) => {
            params.push(Param::Int(*bound));
            Some(format!("{} <= ?", column_name(*column)))
        }
        Condition::Tags { mode, tests } => Some(render_tags(*mode, tests, params)),
        Condition::Search(term) => {
            params.push(Param::Text(term.clone()));
            Some(String::from("instr(lower(e.content), lower(?)) > 0"))
        }
    }
}

fn render_tags(mode: TagMatch, tests: &[TagTest], params: &mut Vec<Param>) -> String {
    match mode {
        TagMatch::AnyName => {
            let disjuncts: Vec<String> = tests
                .iter()
                .map(|test| tag_disjunct(test, params))
                .collect();
            format!(
                "EXISTS (SELECT 1 FROM event_tags AS t WHERE t.event_id = e.id AND ({}))",
                disjuncts.join(" OR ")
            )
        }
        TagMatch::AllNames => {
            let exists: Vec<String> = tests
                .iter()
                .map(|test| {
                    format!(
                        "EXISTS (SELECT 1 FROM event_tags AS t WHERE t.event_id = e.id AND {})",
                        tag_disjunct(test, params)
                    )
                })
                .collect();
            format!("({})", exists.join(" AND "))
        }
    }
}

fn tag_disjunct(test: &TagTest, params: &mut Vec<Param>) -> String {
    params.push(Param::Text(test.name.clone()));
    params.extend(test.values.iter().cloned().map(Param::Text));
    format!(
        "(t.name = ? AND t.value{})",
        membership_clause(test.values.len())
    )
}

fn bounded_select(plan: &Plan, params: &mut Vec<Param>) -> String {
    let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events AS e");
    if let Some(body) = render_condition(&plan.condition, params) {
        sql.push_str(" WHERE ");
        sql.push_str(&body);
    }
    sql.push(' ');
    sql.push_str(ORDER);
    sql.push_str(" LIMIT ?");
    params.push(Param::Int(i64::from(plan.limit)));
    sql
}

fn count_select(condition: &Condition, params: &mut Vec<Param>) -> String {
    let mut sql = String::from("SELECT COUNT(*) FROM events AS e");
    if let Some(body) = render_condition(condition, params) {
        sql.push_str(" WHERE ");
        sql.push_str(&body);
    }
    sql
}

fn column_name(column: Column) -> &'static str {
    match column {
        Column::Id => "e.id",
        Column::Author => "e.pubkey",
        Column::Kind => "e.kind",
        Column::CreatedAt => "e.created_at",
    }
}

/// ` = ?` for one value, ` IN (?,?,...)` for several.
fn membership_clause(len: usize) -> String {
    if len == 1 {
        String::from(" = ?")
    } else {
        format!(" IN (?{})", ",?".repeat(len.saturating_sub(1)))
    }
}
