//! Strategy relevance scoring.
//!
//! Ranks a catalog of therapy strategies against key terms extracted from a
//! client's goals. Domain terms carry importance multipliers; name and
//! category hits earn stacking bonuses; evidence-backed descriptions get a
//! flat boost. Lifecycle reprioritization and age/language personalization
//! are separate stable passes layered on top for client-specific paths.

use chrono::{Datelike, NaiveDate, Utc};

use crate::services::{ClientProfile, GoalSummary, Strategy};
use crate::vocabulary::{
    term_weight, tokenize, ADVANCED_MARKERS, AGE_BRACKETS, DOMAIN_ALLOWLIST, EVIDENCE_MARKERS,
    FOUNDATIONAL_MARKERS, STOPWORDS, THERAPY_PHRASES,
};

/// Extract search terms from a goal and its subgoals: tokens longer than
/// three characters or on the domain allowlist, plus any multi-word therapy
/// phrase found verbatim, minus stopwords. Order of first appearance is kept.
pub fn extract_key_terms(goal: &GoalSummary, subgoals: &[GoalSummary]) -> Vec<String> {
    let mut combined = format!("{} {}", goal.title, goal.description);
    for sub in subgoals {
        combined.push(' ');
        combined.push_str(&sub.title);
        combined.push(' ');
        combined.push_str(&sub.description);
    }
    let combined_lower = combined.to_lowercase();

    let mut terms: Vec<String> = Vec::new();
    for token in tokenize(&combined) {
        if token.len() > 3 || DOMAIN_ALLOWLIST.contains(&token.as_str()) {
            if !terms.contains(&token) {
                terms.push(token);
            }
        }
    }

    for phrase in THERAPY_PHRASES {
        if combined_lower.contains(phrase) {
            let phrase = phrase.to_string();
            if !terms.contains(&phrase) {
                terms.push(phrase);
            }
        }
    }

    terms.retain(|t| !STOPWORDS.contains(&t.as_str()));
    terms
}

/// Score and rank strategies. Zero-scoring strategies are dropped; survivors
/// are sorted by score descending, ties keeping catalog order.
pub fn score_strategies_by_relevance(strategies: &[Strategy], key_terms: &[String]) -> Vec<Strategy> {
    let mut scored: Vec<(u32, &Strategy)> = strategies
        .iter()
        .filter_map(|s| {
            let score = relevance_score(s, key_terms);
            (score > 0).then_some((score, s))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, s)| s.clone()).collect()
}

/// The raw relevance score for one strategy, exposed for tests and for
/// service implementations that want to show scores.
pub fn relevance_score(strategy: &Strategy, key_terms: &[String]) -> u32 {
    let name = strategy.name.to_lowercase();
    let description = strategy
        .description
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let category = strategy
        .category
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let searchable = format!("{name} {description} {category}");

    let mut score = 0u32;
    for term in key_terms {
        let multiplier = term_weight(term);
        let matches = searchable.matches(term.as_str()).count() as u32;
        score += matches * 2 * multiplier;
        // Name and category hits stack on top of the base match score.
        if name.contains(term.as_str()) {
            score += 3 * multiplier;
        }
        if category.contains(term.as_str()) {
            score += 4 * multiplier;
        }
    }

    if EVIDENCE_MARKERS.iter().any(|m| description.contains(m)) {
        score += 5;
    }

    score
}

/// Stable partition by lifecycle stage: foundational strategies first when a
/// goal is early (<30% progress), advanced first when it is nearly done
/// (>70%). Mid-range goals keep the incoming order untouched.
pub fn prioritize_by_lifecycle(strategies: Vec<Strategy>, goal_progress: f64) -> Vec<Strategy> {
    let markers: &[&str] = if goal_progress < 30.0 {
        FOUNDATIONAL_MARKERS
    } else if goal_progress > 70.0 {
        ADVANCED_MARKERS
    } else {
        return strategies;
    };

    let (preferred, rest): (Vec<Strategy>, Vec<Strategy>) = strategies
        .into_iter()
        .partition(|s| markers.iter().any(|m| strategy_text(s).contains(m)));
    preferred.into_iter().chain(rest).collect()
}

/// Re-sort by a secondary personalization score: +3 for an age-bracket
/// keyword match, +2 for the preferred language appearing in the description.
/// The sort is stable, so ties preserve the relevance-scored order.
pub fn personalize_strategies(strategies: Vec<Strategy>, profile: &ClientProfile) -> Vec<Strategy> {
    let age = age_years(profile.date_of_birth);
    let bracket_terms = AGE_BRACKETS
        .iter()
        .find(|(min, max, _)| age >= *min && age <= *max)
        .map(|(_, _, terms)| *terms)
        .unwrap_or(&[]);
    let language = profile.preferred_language.as_ref().map(|l| l.to_lowercase());

    let mut scored: Vec<(u32, Strategy)> = strategies
        .into_iter()
        .map(|s| {
            let text = strategy_text(&s);
            let mut score = 0u32;
            if bracket_terms.iter().any(|t| text.contains(t)) {
                score += 3;
            }
            if let Some(lang) = &language {
                let description = s.description.as_deref().unwrap_or_default().to_lowercase();
                if description.contains(lang.as_str()) {
                    score += 2;
                }
            }
            (score, s)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, s)| s).collect()
}

fn strategy_text(strategy: &Strategy) -> String {
    format!(
        "{} {} {}",
        strategy.name,
        strategy.description.as_deref().unwrap_or_default(),
        strategy.category.as_deref().unwrap_or_default()
    )
    .to_lowercase()
}

fn age_years(date_of_birth: NaiveDate) -> u32 {
    let today = Utc::now().date_naive();
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age.max(0) as u32
}
