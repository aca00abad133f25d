//! Core data model shared across the query engine.
//!
//! Everything here is transient per call except [`ConversationMemory`], whose
//! lifetime is owned entirely by the caller (or the [`crate::session`]
//! wrapper). The engine never mutates a caller-supplied memory in place — it
//! returns a [`MemoryUpdates`] diff and the caller performs the merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single conversation turn. Immutable once appended to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_follow_ups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<ExtractedEntity>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            confidence: None,
            data: None,
            suggested_follow_ups: None,
            entities: None,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    ClientName,
    ClientId,
    GoalName,
    GoalId,
    Date,
    Category,
    Amount,
    Concept,
}

/// A typed span of the original query text. `start..end` are byte offsets
/// into the query string; the slice at those offsets equals `text`.
/// Entities of different kinds may overlap — they are independent
/// annotations, not a segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEntity {
    pub text: String,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    pub start: usize,
    pub end: usize,
}

impl ExtractedEntity {
    pub fn new(text: impl Into<String>, kind: EntityKind, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            kind,
            value: None,
            start,
            end,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

// ============================================================================
// Conversation memory
// ============================================================================

/// Subject/timeframe/category inferred from recent turns, used to resolve
/// pronouns and elliptical follow-ups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextCarryover {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// The only state that crosses call boundaries. `recent_entities` is a
/// sliding window, oldest first, capped at the last 5 existing entries plus
/// any genuinely new entities for the turn (dedup key: text + kind).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMemory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_entities: Vec<ExtractedEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_filters: Option<serde_json::Value>,
    #[serde(default)]
    pub context_carryover: ContextCarryover,
}

/// Diff returned by the engine. `None` fields mean "leave as is"; the caller
/// (or [`crate::session::SessionStore`]) owns the authoritative merge. An
/// empty `last_query` clears the stored value — the error-recovery path uses
/// this so a corrupted context doesn't poison the next turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_entities: Option<Vec<ExtractedEntity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_carryover: Option<ContextCarryover>,
}

impl MemoryUpdates {
    /// Layer `wins` on top of `self`: any field the handler set replaces the
    /// orchestrator's draft value.
    pub fn overlay(mut self, wins: MemoryUpdates) -> MemoryUpdates {
        if wins.last_query.is_some() {
            self.last_query = wins.last_query;
        }
        if wins.last_topic.is_some() {
            self.last_topic = wins.last_topic;
        }
        if wins.recent_entities.is_some() {
            self.recent_entities = wins.recent_entities;
        }
        if wins.context_carryover.is_some() {
            self.context_carryover = wins.context_carryover;
        }
        self
    }
}

// ============================================================================
// Query context and response
// ============================================================================

/// Per-call input supplied fresh by the caller. Read-only to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_client_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_budget_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_goal_id: Option<i64>,
    #[serde(default)]
    pub conversation_history: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_memory: Option<ConversationMemory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationHint {
    BarChart,
    LineChart,
    PieChart,
    ProgressBars,
    Table,
}

/// The single output of [`crate::processor::QueryProcessor::process_query`].
/// Produced fresh per query; never persisted by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub content: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization_hint: Option<VisualizationHint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_follow_ups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detected_entities: Vec<ExtractedEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_updates: Option<MemoryUpdates>,
}

impl AgentResponse {
    pub fn new(content: impl Into<String>, confidence: f32) -> Self {
        Self {
            content: content.into(),
            confidence,
            data: None,
            visualization_hint: None,
            suggested_follow_ups: Vec::new(),
            detected_entities: Vec::new(),
            memory_updates: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_hint(mut self, hint: VisualizationHint) -> Self {
        self.visualization_hint = Some(hint);
        self
    }

    pub fn with_follow_ups(mut self, follow_ups: Vec<String>) -> Self {
        self.suggested_follow_ups = follow_ups;
        self
    }

    pub fn with_memory_updates(mut self, updates: MemoryUpdates) -> Self {
        self.memory_updates = Some(updates);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_handler_fields_win() {
        let draft = MemoryUpdates {
            last_query: Some("how is the budget".into()),
            last_topic: Some("budget_analysis".into()),
            ..Default::default()
        };
        let wins = MemoryUpdates {
            last_topic: Some("error_recovery".into()),
            last_query: Some(String::new()),
            ..Default::default()
        };

        let merged = draft.overlay(wins);
        assert_eq!(merged.last_topic.as_deref(), Some("error_recovery"));
        assert_eq!(merged.last_query.as_deref(), Some(""));
    }

    #[test]
    fn overlay_keeps_draft_when_handler_silent() {
        let draft = MemoryUpdates {
            last_query: Some("show progress".into()),
            last_topic: Some("progress_tracking".into()),
            ..Default::default()
        };
        let merged = draft.clone().overlay(MemoryUpdates::default());
        assert_eq!(merged, draft);
    }

    #[test]
    fn response_serializes_camel_case() {
        let resp = AgentResponse::new("hi", 0.9).with_hint(VisualizationHint::BarChart);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["visualizationHint"], "barchart");
        assert!(json.get("suggestedFollowUps").is_none());
    }
}
