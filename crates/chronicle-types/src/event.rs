//! Event records, kinds, and identity categories.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// A single tag: the first element is the tag name, the rest are values.
pub type Tag = Vec<String>;

/// Event kind code.
///
/// The kind decides which identity category an event belongs to, and
/// therefore whether it may be superseded by a later event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(pub u16);

impl Kind {
    /// Returns the numeric kind code.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Classifies the kind into its identity category.
    pub fn category(self) -> Category {
        match self.0 {
            0 | 3 | 10_000..=19_999 => Category::Replaceable,
            30_000..=39_999 => Category::Addressable,
            _ => Category::Regular,
        }
    }

    /// Whether events of this kind may go through `replace`.
    pub fn is_replaceable(self) -> bool {
        self.category() != Category::Regular
    }
}

impl From<u16> for Kind {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity category of an event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Insert-only, never superseded.
    Regular,
    /// One live event per (kind, author).
    Replaceable,
    /// One live event per (kind, author, `d` tag value).
    Addressable,
}

/// A signed, timestamped record: the atomic unit of storage.
///
/// Events are immutable once stored. Signature checking happens before an
/// event reaches a store and is not repeated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Content-derived identifier (hex SHA-256).
    pub id: String,
    /// Author identity key (hex).
    #[serde(rename = "pubkey")]
    pub author: String,
    /// Creation time in seconds.
    pub created_at: Timestamp,
    /// Category code.
    pub kind: Kind,
    /// Ordered tags; each tag's first element is its name.
    pub tags: Vec<Tag>,
    /// Opaque content.
    pub content: String,
    /// Opaque signature.
    #[serde(rename = "sig")]
    pub signature: String,
}

impl Event {
    /// Returns the identity category of this event's kind.
    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Returns the value of the first `d` tag, or `""` if there is none.
    pub fn d_tag(&self) -> &str {
        self.tag_values("d").next().unwrap_or("")
    }

    /// Iterates the first value of every tag named `name`.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.len() > 1 && tag[0] == name)
            .map(|tag| tag[1].as_str())
    }

    /// Iterates `(name, value)` pairs for every tag that carries a value.
    pub fn indexed_tags(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.tags
            .iter()
            .filter(|tag| tag.len() > 1)
            .map(|tag| (tag[0].as_str(), tag[1].as_str()))
    }

    /// Computes the content-derived id of this event.
    ///
    /// The id is the lowercase hex SHA-256 of the JSON array
    /// `[0, pubkey, created_at, kind, tags, content]`.
    pub fn compute_id(&self) -> String {
        let canonical = serde_json::json!([
            0,
            self.author,
            self.created_at,
            self.kind.0,
            self.tags,
            self.content,
        ]);
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        hex::encode(digest)
    }

    /// Whether the stored id matches the content-derived id.
    pub fn has_valid_id(&self) -> bool {
        self.id == self.compute_id()
    }
}

/// Canonical result ordering: newest first, ties broken by ascending id.
pub fn canonical_order(a: &Event, b: &Event) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Key of an identity category for replaceable and addressable events.
///
/// Two events with the same address compete for a single live slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Event kind.
    pub kind: Kind,
    /// Author identity key.
    pub author: String,
    /// `d` tag value; present only for addressable kinds.
    pub d: Option<String>,
}

impl Address {
    /// Returns the address of `event`, or `None` for regular kinds.
    pub fn of(event: &Event) -> Option<Self> {
        let d = match event.category() {
            Category::Regular => return None,
            Category::Replaceable => None,
            Category::Addressable => Some(event.d_tag().to_string()),
        };
        Some(Self {
            kind: event.kind,
            author: event.author.clone(),
            d,
        })
    }

    /// Whether `event` lives at this address.
    pub fn contains(&self, event: &Event) -> bool {
        event.kind == self.kind
            && event.author == self.author
            && match &self.d {
                Some(d) => event.d_tag() == d,
                None => true,
            }
    }

    /// Flat string form, usable as a lookup key by key-value engines.
    pub fn key(&self) -> String {
        match &self.d {
            Some(d) => format!("{}:{}:{}", self.kind, self.author, d),
            None => format!("{}:{}", self.kind, self.author),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: u16, tags: Vec<Tag>) -> Event {
        Event {
            id: "a".repeat(64),
            author: "b".repeat(64),
            created_at: 1_700_000_000,
            kind: Kind(kind),
            tags,
            content: "hello".to_string(),
            signature: String::new(),
        }
    }

    #[test]
    fn kind_categories() {
        assert_eq!(Kind(0).category(), Category::Replaceable);
        assert_eq!(Kind(1).category(), Category::Regular);
        assert_eq!(Kind(3).category(), Category::Replaceable);
        assert_eq!(Kind(10_002).category(), Category::Replaceable);
        assert_eq!(Kind(20_001).category(), Category::Regular);
        assert_eq!(Kind(30_023).category(), Category::Addressable);
        assert_eq!(Kind(40_000).category(), Category::Regular);
    }

    #[test]
    fn d_tag_takes_first_value_or_empty() {
        let tagged = event(
            30_000,
            vec![
                vec!["e".into(), "x".into()],
                vec!["d".into(), "first".into()],
                vec!["d".into(), "second".into()],
            ],
        );
        assert_eq!(tagged.d_tag(), "first");

        let bare = event(30_000, vec![vec!["d".into()]]);
        assert_eq!(bare.d_tag(), "");
    }

    #[test]
    fn address_depends_on_category() {
        assert!(Address::of(&event(1, vec![])).is_none());

        let replaceable = Address::of(&event(0, vec![])).expect("kind 0 has an address");
        assert_eq!(replaceable.d, None);

        let addressable = Address::of(&event(30_000, vec![vec!["d".into(), "x".into()]]))
            .expect("kind 30000 has an address");
        assert_eq!(addressable.d.as_deref(), Some("x"));
        assert!(addressable.key().ends_with(":x"));
    }

    #[test]
    fn address_contains_checks_d_tag() {
        let stored = event(30_000, vec![vec!["d".into(), "x".into()]]);
        let other = event(30_000, vec![vec!["d".into(), "y".into()]]);
        let address = Address::of(&stored).expect("addressable");
        assert!(address.contains(&stored));
        assert!(!address.contains(&other));
    }

    #[test]
    fn canonical_order_is_newest_first_then_id() {
        let mut a = event(1, vec![]);
        a.id = "b".into();
        a.created_at = 10;
        let mut b = a.clone();
        b.id = "a".into();
        let mut c = a.clone();
        c.id = "c".into();
        c.created_at = 20;

        let mut events = vec![a, b, c];
        events.sort_by(canonical_order);
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn compute_id_is_stable_and_sensitive_to_content() {
        let mut e = event(1, vec![vec!["t".into(), "rust".into()]]);
        let id = e.compute_id();
        assert_eq!(id.len(), 64);
        assert_eq!(id, e.compute_id());

        e.id = id.clone();
        assert!(e.has_valid_id());

        e.content.push('!');
        assert_ne!(id, e.compute_id());
        assert!(!e.has_valid_id());
    }

    #[test]
    fn serde_uses_wire_field_names() {
        let json = serde_json::to_value(event(1, vec![])).expect("should serialize");
        assert!(json.get("pubkey").is_some());
        assert!(json.get("sig").is_some());
        assert_eq!(json["kind"], 1);
    }
}
