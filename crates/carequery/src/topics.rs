//! Coarse topic detection over free text.
//!
//! Scores the query against the curated term sets in [`crate::vocabulary`].
//! Two fallback policies exist on purpose and must not be conflated: the
//! standalone detector always hands back a topic (sentinel on no match), while
//! the variant used by the intent parser's general-question path returns
//! `None` so the caller can distinguish "no topic at all".

use crate::vocabulary::{contains_any, count_occurrences, tokenize, DEFAULT_TOPIC, TOPIC_TABLE};

/// Detect a topic, falling back to the `"general assistance"` sentinel so the
/// caller always has one when this runs standalone.
pub fn detect_topic(query: &str) -> String {
    detect_topic_opt(query).unwrap_or_else(|| DEFAULT_TOPIC.to_string())
}

/// Detect a topic, returning `None` when nothing scores above zero.
pub fn detect_topic_opt(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    let tokens = tokenize(query);
    let token_refs: Vec<&str> = tokens.iter().map(String::as_str).collect();

    let mut best: Option<(&str, usize)> = None;
    for (topic, terms, phrases) in TOPIC_TABLE {
        let mut score = 0usize;
        for term in *terms {
            score += count_occurrences(&token_refs, term);
        }
        // Phrase hits weigh double per word to favor specificity.
        for phrase in *phrases {
            if lower.contains(phrase) {
                score += 2 * phrase.split_whitespace().count();
            }
        }
        // Strictly-greater keeps the first topic in enumeration order on ties.
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((topic, score));
        }
    }

    best.map(|(topic, _)| topic.to_string())
}

/// Term group for a subject name from the ellipsis SUBJECT_MAP, used to avoid
/// double-appending a subject the query already mentions.
pub fn subject_terms(subject: &str) -> Option<&'static [&'static str]> {
    crate::vocabulary::SUBJECT_MAP
        .iter()
        .find(|(name, _)| *name == subject)
        .map(|(_, terms)| *terms)
}

/// First SUBJECT_MAP entry whose term group matches the text, in map order.
pub fn detect_subject(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    crate::vocabulary::SUBJECT_MAP
        .iter()
        .find(|(_, terms)| contains_any(&lower, terms))
        .map(|(name, _)| *name)
}
