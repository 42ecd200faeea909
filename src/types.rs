//! Wire types for the `/sort` endpoint and the classification domain model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Trace,
    Metric,
    Log,
    Error,
    Event,
}

/// One telemetry record submitted for classification. `content` is
/// intentionally schemaless (a recursive JSON value) per the source
/// system's dynamic dict payloads.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Item {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub content: serde_json::Value,
}

/// The `/sort` request payload.
#[derive(Debug, Deserialize, Clone)]
pub struct Batch {
    pub items: Vec<Item>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ForwardTo {
    Alerting,
    Storage,
    Archive,
}

impl From<Category> for ForwardTo {
    fn from(c: Category) -> Self {
        match c {
            Category::Critical => ForwardTo::Alerting,
            Category::Warning => ForwardTo::Storage,
            Category::Info => ForwardTo::Archive,
        }
    }
}

/// Result for a single item. The `category`/`forward_to` pair always
/// satisfies the total mapping in `From<Category> for ForwardTo`; the
/// orchestrator enforces it even if the upstream model only returns one of
/// the two fields, or returns an inconsistent pair.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub forward_to: ForwardTo,
}

impl Classification {
    pub fn from_category(category: Category) -> Self {
        Self {
            category,
            forward_to: ForwardTo::from(category),
        }
    }

    /// The graceful-degradation fallback used when the upstream is
    /// unreachable or misbehaves.
    pub fn fallback() -> Self {
        Self::from_category(Category::Info)
    }

    /// Re-apply the category→forward_to mapping. A no-op on an
    /// already-consistent classification (§8 idempotence property).
    pub fn normalized(self) -> Self {
        Self::from_category(self.category)
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SortedItem {
    pub item: Item,
    pub category: Category,
    pub forward_to: ForwardTo,
}

#[derive(Debug, Serialize, Clone)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub details: String,
    pub request_id: String,
}
