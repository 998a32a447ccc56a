//! The canonical item shape shared by both feed schemas, and the ordered
//! [`Feed`] built from them.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::source::Source;

/// Which document schema an item was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Atom,
    RssV2,
}

/// Position of an item within one aggregation cycle.
///
/// Ordered by input source index first, then by the position of the item
/// inside its source document. Used as the tie-break when dates are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Origin {
    pub(crate) source_index: usize,
    pub(crate) position: usize,
}

/// A single feed entry, normalized from either RSS v2 or Atom.
///
/// Items are only created by the parser. `date` is `None` when the
/// document had no usable date; such items sort before every dated item in
/// ascending order and after them in descending order.
#[derive(Debug, Clone)]
pub struct Item {
    pub title: String,
    pub link: String,
    pub description: String,
    pub content: String,
    pub creator: String,
    pub date: Option<DateTime<Utc>>,
    pub schema: SchemaKind,
    pub(crate) source: Weak<Source>,
    pub(crate) origin: Origin,
}

impl Item {
    pub(crate) fn new(schema: SchemaKind, source: &Arc<Source>, position: usize) -> Self {
        Self {
            title: String::new(),
            link: String::new(),
            description: String::new(),
            content: String::new(),
            creator: String::new(),
            date: None,
            schema,
            source: Arc::downgrade(source),
            origin: Origin {
                source_index: 0,
                position,
            },
        }
    }

    /// The source this item came from, if the registry still holds it.
    pub fn source(&self) -> Option<Arc<Source>> {
        self.source.upgrade()
    }
}

/// Direction of the date ordering of a [`Feed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    /// Newest first.
    #[default]
    Descending,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(format!("unknown sort order '{other}' (expected asc or desc)")),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => f.write_str("ascending"),
            Self::Descending => f.write_str("descending"),
        }
    }
}

/// Items from every source of one cycle, in date order.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    items: Vec<Item>,
}

impl Feed {
    pub(crate) fn from_items(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Sorts by date in the given order.
    ///
    /// Ties are broken by input source order, then by position inside the
    /// source, so the result never depends on fetch completion order.
    /// Descending is the exact reverse of ascending.
    pub fn sort_by(&mut self, order: SortOrder) {
        match order {
            SortOrder::Ascending => self.items.sort_by(ascending),
            SortOrder::Descending => self.items.sort_by(|a, b| ascending(b, a)),
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Feed {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn ascending(a: &Item, b: &Item) -> Ordering {
    a.date.cmp(&b.date).then(a.origin.cmp(&b.origin))
}
