//! Conversation continuity: reference resolution and memory merging.
//!
//! Both operations are pure. Reference resolution rewrites the query text
//! before it reaches the intent parser; memory updates always produce a new
//! value and never touch the caller's copy.

use std::sync::LazyLock;

use crate::topics::{detect_subject, subject_terms};
use crate::types::{
    ContextCarryover, ConversationMemory, EntityKind, ExtractedEntity, Message, MessageRole,
};
use crate::vocabulary::{tokenize, PRONOUNS};

/// Sliding window cap for remembered entities.
pub const RECENT_ENTITY_WINDOW: usize = 5;

static GENDERED_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(he|him|his|she|her|hers)\b").expect("gendered pronoun regex is valid")
});
static OBJECT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(it|its|this|that)\b").expect("object pronoun regex is valid")
});
static PLURAL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(they|them|these|those|their)\b").expect("plural pronoun regex is valid")
});

// Elliptical follow-up prefixes, checked in this order.
static ELLIPSIS_CONTINUATION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)^(and|what about|how about)\b").expect("continuation regex is valid")
});
static ELLIPSIS_REQUEST_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)^(can you|could you|would you)\b").expect("request regex is valid")
});
static ELLIPSIS_VERB_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)^(is|are|was|were|do|does|did)\b").expect("verb-first regex is valid")
});

/// Rewrite a query so pronouns and elliptical follow-ups become explicit.
/// Identity for queries containing no trigger terms. Ellipsis expansion runs
/// second, over the already-pronoun-resolved text.
pub fn resolve_references(query: &str, history: &[Message], memory: &ConversationMemory) -> String {
    let after_pronouns = substitute_pronouns(query, history, memory);
    expand_ellipsis(&after_pronouns, history, memory)
}

fn substitute_pronouns(query: &str, history: &[Message], memory: &ConversationMemory) -> String {
    let tokens = tokenize(query);
    let has_trigger = tokens.iter().any(|t| PRONOUNS.contains(&t.as_str()));
    if !has_trigger {
        return query.to_string();
    }

    // A referent only makes sense once an exchange exists.
    let has_user = history.iter().any(|m| m.role == MessageRole::User);
    let has_assistant = history.iter().any(|m| m.role == MessageRole::Assistant);
    if !has_user || !has_assistant {
        return query.to_string();
    }

    // Referent precedence: gendered -> most recent client entity,
    // object -> carryover subject else last topic, plural -> carryover category.
    let gendered_ref = memory
        .recent_entities
        .iter()
        .rev()
        .find(|e| e.kind == EntityKind::ClientName)
        .map(|e| e.text.clone());
    let object_ref = memory
        .context_carryover
        .subject
        .clone()
        .or_else(|| memory.last_topic.as_ref().map(|t| t.replace('_', " ")));
    let plural_ref = memory.context_carryover.category.clone();

    let mut rewritten = query.to_string();
    for (re, referent) in [
        (&*GENDERED_RE, &gendered_ref),
        (&*OBJECT_RE, &object_ref),
        (&*PLURAL_RE, &plural_ref),
    ] {
        if let Some(referent) = referent {
            rewritten = re
                .replace_all(&rewritten, |_: &regex::Captures<'_>| referent.clone())
                .into_owned();
        }
        // No referent: leave those pronoun instances untouched.
    }

    rewritten
}

fn expand_ellipsis(query: &str, history: &[Message], memory: &ConversationMemory) -> String {
    let prefix = if ELLIPSIS_CONTINUATION_RE.is_match(query) {
        EllipsisPrefix::Continuation
    } else if ELLIPSIS_REQUEST_RE.is_match(query) {
        EllipsisPrefix::Request
    } else if ELLIPSIS_VERB_RE.is_match(query) {
        EllipsisPrefix::VerbFirst
    } else {
        return query.to_string();
    };

    // Subject priority: carryover -> previous user query -> last topic.
    let subject = memory
        .context_carryover
        .subject
        .clone()
        .or_else(|| {
            previous_user_query(history)
                .and_then(|q| detect_subject(q))
                .map(String::from)
        })
        .or_else(|| memory.last_topic.as_ref().map(|t| t.replace('_', " ")));
    let Some(subject) = subject else {
        return query.to_string();
    };

    // Avoid double-appending a subject the query already carries.
    let lower = query.to_lowercase();
    let already_present = match subject_terms(&subject) {
        Some(terms) => terms.iter().any(|t| lower.contains(t)),
        None => lower.contains(&subject.to_lowercase()),
    };
    if already_present {
        return query.to_string();
    }

    match prefix {
        EllipsisPrefix::Continuation => format!("{query} for {subject}"),
        EllipsisPrefix::Request => format!("{query} regarding {subject}"),
        EllipsisPrefix::VerbFirst => format!("{query} {subject}"),
    }
}

#[derive(Clone, Copy)]
enum EllipsisPrefix {
    Continuation,
    Request,
    VerbFirst,
}

fn previous_user_query(history: &[Message]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
}

// ============================================================================
// Memory merging
// ============================================================================

/// Pure merge: returns a new memory, never mutates the input. `last_topic`
/// only changes when a new topic is supplied; entity window and carryover
/// only change when this turn extracted entities.
pub fn update_conversation_memory(
    query: &str,
    entities: &[ExtractedEntity],
    topic: Option<&str>,
    memory: &ConversationMemory,
) -> ConversationMemory {
    let mut next = memory.clone();
    next.last_query = Some(query.to_string());
    if let Some(topic) = topic {
        next.last_topic = Some(topic.to_string());
    }
    if !entities.is_empty() {
        next.recent_entities = merge_recent_entities(&memory.recent_entities, entities);
        next.context_carryover = refresh_carryover(&memory.context_carryover, entities);
    }
    next
}

/// Sliding window: the last [`RECENT_ENTITY_WINDOW`] existing entities,
/// oldest-first, plus any new entities not already present (dedup key:
/// text + kind).
pub fn merge_recent_entities(
    existing: &[ExtractedEntity],
    new: &[ExtractedEntity],
) -> Vec<ExtractedEntity> {
    let skip = existing.len().saturating_sub(RECENT_ENTITY_WINDOW);
    let mut window: Vec<ExtractedEntity> = existing[skip..].to_vec();
    for entity in new {
        let duplicate = window
            .iter()
            .any(|w| w.text == entity.text && w.kind == entity.kind);
        if !duplicate {
            window.push(entity.clone());
        }
    }
    window
}

/// Carryover refresh from this turn's entities: the first client-name entity
/// becomes the subject, the first category entity becomes the category. No
/// aggregation across multiple entities of the same kind.
pub fn refresh_carryover(
    carryover: &ContextCarryover,
    entities: &[ExtractedEntity],
) -> ContextCarryover {
    let mut next = carryover.clone();
    if let Some(client) = entities.iter().find(|e| e.kind == EntityKind::ClientName) {
        next.subject = Some(client.text.clone());
    }
    if let Some(category) = entities.iter().find(|e| e.kind == EntityKind::Category) {
        next.category = Some(category.text.to_lowercase());
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn exchange() -> Vec<Message> {
        vec![
            Message::user("How's the budget for client Jane Doe?"),
            Message::assistant("Jane Doe has $600.00 remaining."),
        ]
    }

    fn memory_with(
        subject: Option<&str>,
        category: Option<&str>,
        topic: Option<&str>,
    ) -> ConversationMemory {
        ConversationMemory {
            last_topic: topic.map(String::from),
            context_carryover: ContextCarryover {
                subject: subject.map(String::from),
                category: category.map(String::from),
                timeframe: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn identity_without_trigger_terms() {
        let memory = memory_with(Some("budget"), Some("speech"), Some("budget"));
        let q = "show me overall spending by category";
        assert_eq!(resolve_references(q, &exchange(), &memory), q);
    }

    #[test]
    fn gendered_pronoun_resolves_to_recent_client() {
        let mut memory = memory_with(None, None, None);
        memory.recent_entities.push(ExtractedEntity::new(
            "Jane Doe",
            EntityKind::ClientName,
            0,
            8,
        ));
        let rewritten = resolve_references("How is she doing lately", &exchange(), &memory);
        assert_eq!(rewritten, "How is Jane Doe doing lately");
    }

    #[test]
    fn pronouns_untouched_without_full_exchange() {
        let mut memory = memory_with(None, None, None);
        memory.recent_entities.push(ExtractedEntity::new(
            "Jane Doe",
            EntityKind::ClientName,
            0,
            8,
        ));
        let history = vec![Message::user("Hello")];
        let q = "How is she doing lately";
        assert_eq!(resolve_references(q, &history, &memory), q);
    }

    #[test]
    fn object_pronoun_uses_carryover_subject() {
        let memory = memory_with(Some("budget"), None, None);
        // "is" prefix would also fire ellipsis, but the subject is already
        // present after substitution, so no append happens.
        let rewritten = resolve_references("is it depleted", &exchange(), &memory);
        assert_eq!(rewritten, "is budget depleted");
    }

    #[test]
    fn object_pronoun_falls_back_to_last_topic() {
        let memory = memory_with(None, None, Some("budget_analysis"));
        let rewritten = resolve_references("tell me about it again", &exchange(), &memory);
        assert_eq!(rewritten, "tell me about budget analysis again");
    }

    #[test]
    fn plural_pronoun_uses_carryover_category() {
        let memory = memory_with(None, Some("speech"), None);
        let rewritten = resolve_references("show them to me now", &exchange(), &memory);
        assert_eq!(rewritten, "show speech to me now");
    }

    #[test]
    fn unresolvable_pronoun_left_verbatim() {
        let memory = ConversationMemory::default();
        let q = "how is she doing";
        assert_eq!(resolve_references(q, &exchange(), &memory), q);
    }

    #[test]
    fn ellipsis_appends_subject_from_previous_query() {
        // Scenario: carryover unset, previous user turn mentioned the budget,
        // last topic is something other than progress.
        let memory = memory_with(None, None, Some("budget_analysis"));
        let rewritten = resolve_references("and what about progress", &exchange(), &memory);
        assert_eq!(rewritten, "and what about progress for budget");
    }

    #[test]
    fn ellipsis_skips_when_subject_already_present() {
        let memory = memory_with(Some("progress"), None, None);
        let q = "and what about progress";
        assert_eq!(resolve_references(q, &exchange(), &memory), q);
    }

    #[test]
    fn request_prefix_uses_regarding_glue() {
        let memory = memory_with(Some("budget"), None, None);
        let rewritten = resolve_references("can you elaborate", &exchange(), &memory);
        assert_eq!(rewritten, "can you elaborate regarding budget");
    }

    #[test]
    fn verb_prefix_appends_subject_directly() {
        let memory = memory_with(Some("strategy"), None, None);
        let rewritten = resolve_references("are any outdated", &exchange(), &memory);
        assert_eq!(rewritten, "are any outdated strategy");
    }

    #[test]
    fn memory_merge_window_and_dedup() {
        let existing: Vec<ExtractedEntity> = (0..7)
            .map(|i| ExtractedEntity::new(format!("E{i}"), EntityKind::ClientName, 0, 2))
            .collect();
        let new = vec![
            ExtractedEntity::new("E6", EntityKind::ClientName, 0, 2), // duplicate
            ExtractedEntity::new("Fresh One", EntityKind::ClientName, 0, 9),
        ];

        let merged = merge_recent_entities(&existing, &new);
        assert_eq!(merged.len(), RECENT_ENTITY_WINDOW + 1);
        assert_eq!(merged.first().unwrap().text, "E2"); // oldest-first window
        assert_eq!(merged.last().unwrap().text, "Fresh One");

        let mut seen = std::collections::HashSet::new();
        for e in &merged {
            assert!(seen.insert((e.text.clone(), e.kind)), "duplicate {e:?}");
        }
    }

    #[test]
    fn update_memory_is_pure_and_conditional() {
        let memory = memory_with(Some("budget"), None, Some("budget_analysis"));
        let before = memory.clone();

        // No entities, no topic: only last_query changes.
        let next = update_conversation_memory("hello", &[], None, &memory);
        assert_eq!(next.last_query.as_deref(), Some("hello"));
        assert_eq!(next.last_topic, before.last_topic);
        assert_eq!(next.context_carryover, before.context_carryover);
        assert_eq!(memory, before);

        // Entities refresh the window and carryover.
        let entities = vec![
            ExtractedEntity::new("John Smith", EntityKind::ClientName, 0, 10),
            ExtractedEntity::new("Motor", EntityKind::Category, 20, 25),
        ];
        let next =
            update_conversation_memory("about John Smith", &entities, Some("progress"), &memory);
        assert_eq!(next.last_topic.as_deref(), Some("progress"));
        assert_eq!(next.context_carryover.subject.as_deref(), Some("John Smith"));
        assert_eq!(next.context_carryover.category.as_deref(), Some("motor"));
        assert_eq!(next.recent_entities.len(), 2);
    }
}
