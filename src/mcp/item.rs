//! Context and memory records held by the protocol store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::str::FromStr;
use uuid::Uuid;

/// Lower bound for relevance and importance scores
pub const MIN_SCORE: f64 = 0.0;

/// Upper bound for relevance and importance scores
pub const MAX_SCORE: f64 = 1.0;

/// Auxiliary key/value annotations attached to items and aggregates
pub type Metadata = BTreeMap<String, Value>;

/// Clamp a score into `[MIN_SCORE, MAX_SCORE]`. NaN collapses to the minimum.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return MIN_SCORE;
    }
    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// Build the `{source, data_type}` metadata every factory attaches
pub(crate) fn origin_metadata(source: &str, data_type: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), Value::String(source.to_string()));
    metadata.insert("data_type".to_string(), Value::String(data_type.to_string()));
    metadata
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ─── Content ────────────────────────────────────────────────────────

/// Opaque item payload.
///
/// The store only distinguishes free text and string-keyed mappings; anything
/// else is carried verbatim and skipped by all matching logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Map(Map<String, Value>),
    Other(Value),
}

impl Content {
    /// Classify a JSON value into text, mapping, or other
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(map) => Self::Map(map),
            other => Self::Other(other),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// True when this is text containing `needle`, ignoring case.
    /// `needle` must already be lowercase.
    pub(crate) fn text_contains(&self, needle: &str) -> bool {
        self.as_text()
            .is_some_and(|text| text.to_lowercase().contains(needle))
    }

    /// True when this is text containing `needle`, or a mapping with at least
    /// one text value containing it. `needle` must already be lowercase.
    pub(crate) fn text_or_values_contain(&self, needle: &str) -> bool {
        match self {
            Self::Text(text) => text.to_lowercase().contains(needle),
            Self::Map(map) => map.values().any(|value| {
                value
                    .as_str()
                    .is_some_and(|text| text.to_lowercase().contains(needle))
            }),
            Self::Other(_) => false,
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Map<String, Value>> for Content {
    fn from(map: Map<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

// ─── Type discriminators ────────────────────────────────────────────

/// Kind of a context item. Unknown kinds are kept in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContextType {
    Github,
    Rag,
    UserMessage,
    AssistantMessage,
    Other(String),
}

impl ContextType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Github => "github",
            Self::Rag => "rag",
            Self::UserMessage => "user_message",
            Self::AssistantMessage => "assistant_message",
            Self::Other(name) => name,
        }
    }

    /// User or assistant chat turn
    pub fn is_conversation(&self) -> bool {
        matches!(self, Self::UserMessage | Self::AssistantMessage)
    }
}

impl From<String> for ContextType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "github" => Self::Github,
            "rag" => Self::Rag,
            "user_message" => Self::UserMessage,
            "assistant_message" => Self::AssistantMessage,
            _ => Self::Other(name),
        }
    }
}

impl From<ContextType> for String {
    fn from(kind: ContextType) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for ContextType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a memory item. Unknown kinds are kept in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryType {
    Fact,
    Preference,
    Pattern,
    Other(String),
}

impl MemoryType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Pattern => "pattern",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for MemoryType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "fact" => Self::Fact,
            "preference" => Self::Preference,
            "pattern" => Self::Pattern,
            _ => Self::Other(name),
        }
    }
}

impl From<MemoryType> for String {
    fn from(kind: MemoryType) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for MemoryType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── ContextItem ────────────────────────────────────────────────────

/// One unit of situational information available to the assistant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextItem {
    id: String,
    #[serde(rename = "type")]
    kind: ContextType,
    content: Content,
    metadata: Metadata,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    source: String,
    relevance_score: f64,
}

impl ContextItem {
    /// Create an item with a fresh id, empty metadata and zero relevance
    pub fn new(kind: ContextType, content: impl Into<Content>, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            kind,
            content: content.into(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            source: source.into(),
            relevance_score: MIN_SCORE,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = clamp_score(score);
        self
    }

    /// Backdate the item; both timestamps are set to `at`
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &ContextType {
        &self.kind
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn relevance_score(&self) -> f64 {
        self.relevance_score
    }

    pub(crate) fn apply(&mut self, update: ContextItemUpdate, now: DateTime<Utc>) {
        if let Some(kind) = update.kind {
            self.kind = kind;
        }
        if let Some(content) = update.content {
            self.content = content;
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        if let Some(source) = update.source {
            self.source = source;
        }
        if let Some(score) = update.relevance_score {
            self.relevance_score = clamp_score(score);
        }
        self.updated_at = now;
    }
}

/// Field updates for [`ContextItem`]. `id` and `created_at` are immutable.
#[derive(Debug, Clone, Default)]
pub struct ContextItemUpdate {
    pub kind: Option<ContextType>,
    pub content: Option<Content>,
    pub metadata: Option<Metadata>,
    pub source: Option<String>,
    pub relevance_score: Option<f64>,
}

impl ContextItemUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: ContextType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn content(mut self, content: impl Into<Content>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn relevance_score(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }
}

// ─── MemoryItem ─────────────────────────────────────────────────────

/// One remembered fact, preference or interaction pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryItem {
    id: String,
    #[serde(rename = "type")]
    kind: MemoryType,
    content: Content,
    metadata: Metadata,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    access_count: u64,
    importance_score: f64,
}

impl MemoryItem {
    /// Create an item with a fresh id, zero accesses and zero importance
    pub fn new(kind: MemoryType, content: impl Into<Content>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            kind,
            content: content.into(),
            metadata: Metadata::new(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
            importance_score: MIN_SCORE,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_importance(mut self, score: f64) -> Self {
        self.importance_score = clamp_score(score);
        self
    }

    /// Backdate the item; `last_accessed` follows `created_at`
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.last_accessed = at;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &MemoryType {
        &self.kind
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn importance_score(&self) -> f64 {
        self.importance_score
    }

    /// Age in whole days at `now`
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }

    pub(crate) fn apply(&mut self, update: MemoryItemUpdate, now: DateTime<Utc>) {
        if let Some(kind) = update.kind {
            self.kind = kind;
        }
        if let Some(content) = update.content {
            self.content = content;
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        if let Some(score) = update.importance_score {
            self.importance_score = clamp_score(score);
        }
        self.last_accessed = now;
        self.access_count += 1;
    }
}

/// Field updates for [`MemoryItem`]. `id`, `created_at` and the access
/// bookkeeping are managed by the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryItemUpdate {
    pub kind: Option<MemoryType>,
    pub content: Option<Content>,
    pub metadata: Option<Metadata>,
    pub importance_score: Option<f64>,
}

impl MemoryItemUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: MemoryType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn content(mut self, content: impl Into<Content>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn importance_score(mut self, score: f64) -> Self {
        self.importance_score = Some(score);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(1.4), 1.0);
        assert_eq!(clamp_score(-0.3), 0.0);
        assert_eq!(clamp_score(0.42), 0.42);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }

    #[test]
    fn test_content_classification() {
        assert_eq!(Content::from(json!("hi")), Content::Text("hi".to_string()));
        assert!(Content::from(json!({"a": 1})).as_map().is_some());
        assert!(matches!(Content::from(json!([1, 2])), Content::Other(_)));
    }

    #[test]
    fn test_text_matching_ignores_case() {
        let content = Content::from("Dhurkesh worked at X");
        assert!(content.text_contains("dhurkesh"));
        assert!(!content.text_contains("rust"));

        let map = Content::from(json!({"likes": "Loves Project management", "n": 3}));
        assert!(!map.text_contains("project"));
        assert!(map.text_or_values_contain("project"));

        let other = Content::from(json!(["project"]));
        assert!(!other.text_or_values_contain("project"));
    }

    #[test]
    fn test_type_names_round_trip_through_strings() {
        assert_eq!("user_message".parse::<ContextType>().unwrap(), ContextType::UserMessage);
        assert_eq!(
            "linkedin".parse::<ContextType>().unwrap(),
            ContextType::Other("linkedin".to_string())
        );
        assert_eq!(MemoryType::Preference.to_string(), "preference");
        assert_eq!(
            serde_json::to_value(MemoryType::Other("habit".into())).unwrap(),
            json!("habit")
        );
    }

    #[test]
    fn test_context_update_clamps_and_touches() {
        let mut item = ContextItem::new(ContextType::Rag, "notes", "rag");
        let before = item.updated_at();
        item.apply(ContextItemUpdate::new().relevance_score(3.0), Utc::now());
        assert_eq!(item.relevance_score(), 1.0);
        assert!(item.updated_at() >= before);
    }

    #[test]
    fn test_memory_update_counts_access() {
        let mut item = MemoryItem::new(MemoryType::Fact, "fact").with_importance(0.5);
        item.apply(MemoryItemUpdate::new().importance_score(-1.0), Utc::now());
        item.apply(MemoryItemUpdate::new(), Utc::now());
        assert_eq!(item.importance_score(), 0.0);
        assert_eq!(item.access_count(), 2);
    }
}
