//! Entity extraction over raw query text.
//!
//! Pure pattern scanning, no I/O. Each rule collects all non-overlapping
//! matches; rules run in a fixed source order. Client names are matched with
//! no roster validation — over-matches are expected and tolerated downstream.

use std::sync::LazyLock;

use chrono::NaiveDate;
use serde_json::json;

use crate::types::{EntityKind, ExtractedEntity};
use crate::vocabulary::THERAPY_CATEGORIES;

// Pre-compiled regexes — compiled once, reused on every call.
static CLIENT_NAME_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b[A-Z][a-z]+(?: [A-Z][a-z]+)*\b").expect("client name regex is valid")
});
static GOAL_NAME_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#""([^"]+)""#).expect("goal name regex is valid"));
static DATE_TEXT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
    )
    .expect("textual date regex is valid")
});
static DATE_NUM_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("numeric date regex is valid")
});
static AMOUNT_DOLLAR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$(\d+(?:\.\d{1,2})?)").expect("dollar amount regex is valid")
});
static AMOUNT_WORD_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(\d+(?:\.\d{1,2})?)\s*dollars\b").expect("word amount regex is valid")
});
static CATEGORY_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    let alternation = THERAPY_CATEGORIES.join("|");
    regex::Regex::new(&format!(r"(?i)\b({alternation})\b")).expect("category regex is valid")
});

/// Single capitalized words that open questions or commands. A lone match on
/// one of these is sentence casing, not a client name.
const NON_NAME_WORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "which", "who", "show", "tell", "give", "list", "find",
    "compare", "chart", "graph", "plot", "visualize", "can", "could", "would", "should", "will",
    "is", "are", "was", "were", "do", "does", "did", "the", "please", "let", "we", "my", "good",
    "hello", "hi", "thanks", "thank", "okay", "yes", "no", "budget", "spending", "progress",
    "goal", "goals", "milestones", "attendance", "strategies", "strategy", "client", "clients",
    "session", "sessions", "statistics", "overview",
];

/// Extract all typed mentions from a query. Deterministic; offsets are byte
/// positions into the original string and round-trip: `&query[start..end] ==
/// text` for every returned entity.
pub fn extract_entities(query: &str) -> Vec<ExtractedEntity> {
    let mut entities = Vec::new();

    for mat in CLIENT_NAME_RE.find_iter(query) {
        let text = mat.as_str();
        if !text.contains(' ') && NON_NAME_WORDS.contains(&text.to_lowercase().as_str()) {
            continue;
        }
        entities.push(ExtractedEntity::new(
            text,
            EntityKind::ClientName,
            mat.start(),
            mat.end(),
        ));
    }

    for cap in GOAL_NAME_RE.captures_iter(query) {
        if let Some(inner) = cap.get(1) {
            entities.push(ExtractedEntity::new(
                inner.as_str(),
                EntityKind::GoalName,
                inner.start(),
                inner.end(),
            ));
        }
    }

    for cap in DATE_TEXT_RE.captures_iter(query) {
        let mat = cap.get(0).expect("whole match always present");
        let mut entity =
            ExtractedEntity::new(mat.as_str(), EntityKind::Date, mat.start(), mat.end());
        if let Some(date) = parse_textual_date(&cap) {
            entity = entity.with_value(json!(date.to_string()));
        }
        entities.push(entity);
    }

    for cap in DATE_NUM_RE.captures_iter(query) {
        let mat = cap.get(0).expect("whole match always present");
        let mut entity =
            ExtractedEntity::new(mat.as_str(), EntityKind::Date, mat.start(), mat.end());
        // D/M/YYYY: day first
        let day: u32 = cap[1].parse().unwrap_or(0);
        let month: u32 = cap[2].parse().unwrap_or(0);
        let year: i32 = cap[3].parse().unwrap_or(0);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            entity = entity.with_value(json!(date.to_string()));
        }
        entities.push(entity);
    }

    for cap in AMOUNT_DOLLAR_RE.captures_iter(query) {
        let mat = cap.get(0).expect("whole match always present");
        let mut entity =
            ExtractedEntity::new(mat.as_str(), EntityKind::Amount, mat.start(), mat.end());
        if let Ok(value) = cap[1].parse::<f64>() {
            entity = entity.with_value(json!(value));
        }
        entities.push(entity);
    }

    for cap in AMOUNT_WORD_RE.captures_iter(query) {
        let mat = cap.get(0).expect("whole match always present");
        let mut entity =
            ExtractedEntity::new(mat.as_str(), EntityKind::Amount, mat.start(), mat.end());
        if let Ok(value) = cap[1].parse::<f64>() {
            entity = entity.with_value(json!(value));
        }
        entities.push(entity);
    }

    for mat in CATEGORY_RE.find_iter(query) {
        entities.push(
            ExtractedEntity::new(mat.as_str(), EntityKind::Category, mat.start(), mat.end())
                .with_value(json!(mat.as_str().to_lowercase())),
        );
    }

    entities
}

fn parse_textual_date(cap: &regex::Captures<'_>) -> Option<NaiveDate> {
    let month = month_number(&cap[1])?;
    let day: u32 = cap[2].parse().ok()?;
    let year: i32 = cap[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.to_lowercase();
    let month = match &prefix[..3.min(prefix.len())] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_round_trip() {
        let query = r#"Show "Improve articulation" spending for Jane Doe: $120.50 on March 3rd, 2024 in speech therapy"#;
        let entities = extract_entities(query);
        assert!(!entities.is_empty());
        for e in &entities {
            assert_eq!(&query[e.start..e.end], e.text, "offset mismatch for {e:?}");
        }
    }

    #[test]
    fn extracts_multi_word_client_name() {
        let entities = extract_entities("How is Jane Doe progressing?");
        let name = entities
            .iter()
            .find(|e| e.kind == EntityKind::ClientName && e.text == "Jane Doe");
        assert!(name.is_some());
    }

    #[test]
    fn extracts_goal_name_inside_quotes() {
        let entities = extract_entities(r#"Strategies for "Expand vocabulary" please"#);
        let goal = entities
            .iter()
            .find(|e| e.kind == EntityKind::GoalName)
            .unwrap();
        assert_eq!(goal.text, "Expand vocabulary");
    }

    #[test]
    fn parses_textual_date() {
        let entities = extract_entities("Spending since January 5th, 2024");
        let date = entities.iter().find(|e| e.kind == EntityKind::Date).unwrap();
        assert_eq!(date.value, Some(serde_json::json!("2024-01-05")));
    }

    #[test]
    fn parses_numeric_date_day_first() {
        let entities = extract_entities("Sessions before 3/11/2024");
        let date = entities.iter().find(|e| e.kind == EntityKind::Date).unwrap();
        assert_eq!(date.value, Some(serde_json::json!("2024-11-03")));
    }

    #[test]
    fn invalid_date_still_extracted_without_value() {
        let entities = extract_entities("Something on 31/13/2024 maybe");
        let date = entities.iter().find(|e| e.kind == EntityKind::Date).unwrap();
        assert!(date.value.is_none());
    }

    #[test]
    fn extracts_amounts_both_forms() {
        let entities = extract_entities("We spent $45.25 and then 30 dollars more");
        let amounts: Vec<_> = entities
            .iter()
            .filter(|e| e.kind == EntityKind::Amount)
            .collect();
        assert_eq!(amounts.len(), 2);
        assert_eq!(amounts[0].value, Some(serde_json::json!(45.25)));
        assert_eq!(amounts[1].value, Some(serde_json::json!(30.0)));
    }

    #[test]
    fn categories_match_whole_words_case_insensitive() {
        let entities = extract_entities("Focus on Speech and sensory work");
        let cats: Vec<_> = entities
            .iter()
            .filter(|e| e.kind == EntityKind::Category)
            .map(|e| e.value.clone())
            .collect();
        assert!(cats.contains(&Some(serde_json::json!("speech"))));
        assert!(cats.contains(&Some(serde_json::json!("sensory"))));
    }

    #[test]
    fn question_openers_are_not_client_names() {
        let entities = extract_entities("What's the plan for Jane Doe?");
        let names: Vec<_> = entities
            .iter()
            .filter(|e| e.kind == EntityKind::ClientName)
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].text, "Jane Doe");
    }

    #[test]
    fn no_entities_in_plain_lowercase_text() {
        let entities = extract_entities("how much is remaining overall");
        assert!(entities.is_empty());
    }
}
