//! Record model shared by every collection the console reads.
//!
//! Projects, testimonials and contact messages carry different domain fields but
//! the listing and activity code only ever looks at `id`, `category`,
//! `created_at` and one label field, so a single loosely-typed [`Record`] is used
//! for all of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Category substituted for records stored without one.
pub const SENTINEL_CATEGORY: &str = "other";

/// Remote collections the console knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Registered user profiles (counted only).
    Profiles,
    Projects,
    /// Client testimonials, stored as `client_feedbacks`.
    Testimonials,
    /// Contact form submissions, stored as `contact_messages`.
    Messages,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Profiles,
        Collection::Projects,
        Collection::Testimonials,
        Collection::Messages,
    ];

    /// Table name in the backing store.
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Profiles => "profiles",
            Collection::Projects => "projects",
            Collection::Testimonials => "client_feedbacks",
            Collection::Messages => "contact_messages",
        }
    }

    pub fn from_table(name: &str) -> Option<Self> {
        Collection::ALL.into_iter().find(|c| c.table() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// One row of any collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Domain fields (`title`, `client_name`, `name`, `description`, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: None,
            created_at: None,
            fields: Map::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// String value of a domain field, if present and a string.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    /// Category as displayed; missing or blank categories read as the sentinel.
    pub fn category(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => SENTINEL_CATEGORY,
        }
    }

    /// Rewrites a missing or blank category to the sentinel.
    pub fn normalize(mut self) -> Self {
        let missing = self
            .category
            .as_deref()
            .map_or(true, |c| c.trim().is_empty());
        if missing {
            self.category = Some(SENTINEL_CATEGORY.to_string());
        }
        self
    }

    fn matches(&self, filter: &FieldFilter) -> bool {
        match filter.field.as_str() {
            "id" => self.id == filter.value,
            "category" => self.category() == filter.value,
            other => self.text(other) == Some(filter.value.as_str()),
        }
    }
}

/// Equality filter on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

impl FieldFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.matches(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// `created_at` descending; rows without a timestamp go last.
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Query against one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub filter: Option<FieldFilter>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn newest_first() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Applies filter, order and limit to an unordered set of rows.
    pub fn apply(&self, rows: Vec<Record>) -> Vec<Record> {
        let mut rows: Vec<Record> = match &self.filter {
            Some(f) => rows.into_iter().filter(|r| f.matches(r)).collect(),
            None => rows,
        };
        // Option<DateTime> orders None first; reverse for newest first puts None last.
        match self.order {
            SortOrder::NewestFirst => rows.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::OldestFirst => rows.sort_by(|a, b| match (a.created_at, b.created_at) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }),
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Insert or update.
    Upsert,
    Remove,
}

/// Change notification. Says that a collection moved, not what it now holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub record_id: Option<String>,
}
