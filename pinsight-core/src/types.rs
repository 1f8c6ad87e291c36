//! Core domain types for pinsight
//!
//! The only persisted entity is the [`Event`]: one recorded user interaction
//! with the product. Events are written by an external producer, stored once
//! and never mutated.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Event** | One user interaction, tagged with an [`EventType`] |
//! | **Properties** | Event-type specific payload, never validated |
//! | **Metadata** | Optional client context (platform, browser, device, ...) |
//! | **Extra** | Unknown top-level fields kept verbatim (the store is schema-less) |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================
// Event type
// ============================================

/// The feature an event was recorded for.
///
/// Producers are expected to stick to the known tags, but the store does not
/// enforce it, so anything else is carried as [`EventType::Other`] and grouped
/// as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    KeywordSearch,
    PinExplorerByKeyword,
    PinExplorerByUrl,
    ProfileExplorer,
    CreateImagesToBlog,
    CreateTopicToBlog,
    CreateTitleDescription,
    /// Tag outside the known set
    Other(String),
}

impl EventType {
    /// All tags a well-behaved producer may emit.
    pub const KNOWN: [EventType; 7] = [
        EventType::KeywordSearch,
        EventType::PinExplorerByKeyword,
        EventType::PinExplorerByUrl,
        EventType::ProfileExplorer,
        EventType::CreateImagesToBlog,
        EventType::CreateTopicToBlog,
        EventType::CreateTitleDescription,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            EventType::KeywordSearch => "keyword_search",
            EventType::PinExplorerByKeyword => "pin_explorer_by_keyword",
            EventType::PinExplorerByUrl => "pin_explorer_by_url",
            EventType::ProfileExplorer => "profile_explorer",
            EventType::CreateImagesToBlog => "create_images_to_blog",
            EventType::CreateTopicToBlog => "create_topic_to_blog",
            EventType::CreateTitleDescription => "create_title_description",
            EventType::Other(tag) => tag,
        }
    }

    /// Whether this tag belongs to the enumerated set.
    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Other(_))
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "keyword_search" => EventType::KeywordSearch,
            "pin_explorer_by_keyword" => EventType::PinExplorerByKeyword,
            "pin_explorer_by_url" => EventType::PinExplorerByUrl,
            "profile_explorer" => EventType::ProfileExplorer,
            "create_images_to_blog" => EventType::CreateImagesToBlog,
            "create_topic_to_blog" => EventType::CreateTopicToBlog,
            "create_title_description" => EventType::CreateTitleDescription,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        EventType::from(s.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Metadata
// ============================================

/// Optional client context attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    /// Deployment environment (e.g. "production", "staging")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Client platform (e.g. "web", "ios")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    /// User's language/region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

// ============================================
// Event
// ============================================

/// One recorded user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Globally unique identifier
    pub event_id: String,
    /// `None` only for documents written without a tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    /// When the event occurred. `None` means "now" at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Plan the user was on (free text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,
    /// Plan state (free text, e.g. "trial", "active")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_in_trial: Option<f64>,
    /// Event-type specific payload
    #[serde(default = "empty_object")]
    pub properties: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    /// Unrecognized top-level fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Event {
    /// Create an event with a fresh v4 `eventId` and no optional context.
    pub fn new(
        event_type: EventType,
        user_id: impl Into<String>,
        subscription_type: impl Into<String>,
        subscription_status: impl Into<String>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: Some(event_type),
            timestamp: None,
            user_id: Some(user_id.into()),
            subscription_type: Some(subscription_type.into()),
            subscription_status: Some(subscription_status.into()),
            days_in_trial: None,
            properties: empty_object(),
            metadata: None,
            extra: Map::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_days_in_trial(mut self, days: f64) -> Self {
        self.days_in_trial = Some(days);
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }
}
