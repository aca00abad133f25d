//! Shared keyword and phrase tables.
//!
//! Every curated term list lives here so the intent parser, topic classifier,
//! conversation manager, and strategy scorer read from one versioned asset.
//! Earlier iterations duplicated these lists per module and they drifted;
//! edits to domain terms must only ever touch this file.

// ============================================================================
// Therapy categories (entity extraction + plural-pronoun referents)
// ============================================================================

pub const THERAPY_CATEGORIES: &[&str] = &[
    "speech",
    "language",
    "motor",
    "cognitive",
    "sensory",
    "behavioral",
    "social",
];

// ============================================================================
// Topic classifier term sets
// ============================================================================

/// One entry per candidate topic: (name, single-word terms, multi-word
/// phrases). Enumeration order breaks score ties — first listed wins.
pub const TOPIC_TABLE: &[(&str, &[&str], &[&str])] = &[
    (
        "budget",
        &[
            "budget", "funding", "cost", "costs", "expense", "expenses", "money", "spending",
            "funds", "dollars",
        ],
        &[
            "budget plan",
            "remaining funds",
            "budget utilization",
            "spending forecast",
            "budget line item",
        ],
    ),
    (
        "progress",
        &[
            "progress",
            "goal",
            "goals",
            "milestone",
            "milestones",
            "improvement",
            "development",
            "achievement",
        ],
        &["goal progress", "progress report", "milestone completion"],
    ),
    (
        "strategies",
        &[
            "strategy",
            "strategies",
            "intervention",
            "interventions",
            "technique",
            "techniques",
            "approach",
            "activities",
        ],
        &[
            "therapy strategies",
            "recommended strategies",
            "evidence based",
        ],
    ),
    (
        "clients",
        &["client", "clients", "caseload", "roster"],
        &["client profile", "new client"],
    ),
    (
        "sessions",
        &[
            "session",
            "sessions",
            "appointment",
            "appointments",
            "attendance",
            "scheduling",
        ],
        &["therapy session", "session notes", "attendance rate"],
    ),
];

/// Sentinel returned by the standalone topic detector when nothing scores.
pub const DEFAULT_TOPIC: &str = "general assistance";

// ============================================================================
// Intent trigger lists (first-match-wins cascade, see intent.rs)
// ============================================================================

pub const STATS_TERMS: &[&str] = &[
    "statistics",
    "stats",
    "how many clients",
    "database",
    "demographics",
    "client count",
    "across all clients",
    "caseload numbers",
];

pub const COMBINED_TERMS: &[&str] = &[
    "overview",
    "summary",
    "insight",
    "insights",
    "big picture",
    "overall status",
    "comprehensive",
    "everything",
    "how are things",
];

pub const BUDGET_TERMS: &[&str] = &[
    "budget", "spending", "spend", "spent", "cost", "expense", "money", "funds", "financial",
    "allocation", "dollar",
];

pub const BUDGET_REMAINING_TERMS: &[&str] = &["remaining", "left", "balance", "available"];

pub const BUDGET_FORECAST_TERMS: &[&str] = &[
    "forecast",
    "depletion",
    "run out",
    "deplete",
    "projection",
    "predict",
    "last until",
];

pub const BUDGET_UTILIZATION_TERMS: &[&str] = &["utilization", "utilisation", "usage", "used", "rate"];

pub const PROGRESS_TERMS: &[&str] = &[
    "progress",
    "goal",
    "goals",
    "milestone",
    "improvement",
    "achievement",
    "development",
    "attendance",
];

pub const PROGRESS_MILESTONE_TERMS: &[&str] = &["milestone", "milestones"];

pub const PROGRESS_ATTENDANCE_TERMS: &[&str] = &[
    "attendance",
    "session",
    "sessions",
    "cancelled",
    "canceled",
    "cancellation",
    "no-show",
];

pub const PROGRESS_GOAL_TERMS: &[&str] = &["goal", "goals", "objective", "objectives"];

pub const STRATEGY_TERMS: &[&str] = &[
    "strategy",
    "strategies",
    "recommend",
    "recommendation",
    "recommendations",
    "intervention",
    "interventions",
    "technique",
    "techniques",
    "activity",
    "activities",
];

pub const STRATEGY_FOR_GOAL_TERMS: &[&str] = &["for the goal", "goal", "objective"];

pub const STRATEGY_FOR_CLIENT_TERMS: &[&str] = &[
    "for this client",
    "for the client",
    "personalized",
    "personalised",
    "tailored",
    "for them",
];

pub const VISUALIZATION_TERMS: &[&str] = &[
    "visualize",
    "visualise",
    "chart",
    "graph",
    "plot",
    "diagram",
];

/// Secondary keyword sets for the visualization remap. These are broader than
/// the primary intent triggers: a query like "chart the utilization" never
/// reaches the budget stage, so the remap needs its own membership test.
pub const VIZ_BUDGET_SECONDARY: &[&str] =
    &["budget", "spending", "utilization", "utilisation", "usage", "cost"];

pub const VIZ_PROGRESS_SECONDARY: &[&str] = &["progress", "goal", "milestone", "improvement"];

// ============================================================================
// Reference resolution
// ============================================================================

/// Whole-word triggers for the pronoun-substitution pass.
pub const PRONOUNS: &[&str] = &[
    "it", "its", "this", "that", "they", "them", "these", "those", "their", "he", "him", "his",
    "she", "her", "hers",
];

pub const GENDERED_PRONOUNS: &[&str] = &["he", "him", "his", "she", "her", "hers"];
pub const OBJECT_PRONOUNS: &[&str] = &["it", "its", "this", "that"];
pub const PLURAL_PRONOUNS: &[&str] = &["they", "them", "these", "those", "their"];

/// Subjects an elliptical follow-up can inherit, with the term group that
/// identifies each in a prior query. Map order is the scan priority.
pub const SUBJECT_MAP: &[(&str, &[&str])] = &[
    (
        "budget",
        &["budget", "spending", "funds", "cost", "expense", "money"],
    ),
    (
        "progress",
        &["progress", "goal", "milestone", "improvement"],
    ),
    (
        "strategy",
        &[
            "strategy",
            "strategies",
            "recommendation",
            "intervention",
            "technique",
        ],
    ),
    ("client", &["client", "patient", "caseload"]),
    ("session", &["session", "appointment", "attendance", "visit"]),
];

// ============================================================================
// Strategy scorer vocabulary
// ============================================================================

/// Short tokens worth keeping during key-term extraction even though they
/// fail the length cut.
pub const DOMAIN_ALLOWLIST: &[&str] = &[
    "aac", "oral", "fine", "gross", "play", "cue", "cues", "sign", "turn", "asd",
];

/// Multi-word therapy phrases scanned verbatim in goal text.
pub const THERAPY_PHRASES: &[&str] = &[
    "fine motor",
    "gross motor",
    "expressive language",
    "receptive language",
    "social skills",
    "sensory integration",
    "joint attention",
    "speech sounds",
    "turn taking",
    "emotional regulation",
    "oral motor",
    "self regulation",
    "problem solving",
    "augmentative communication",
];

/// Importance multipliers for key terms. Anything absent defaults to 1.
pub const DOMAIN_TERM_WEIGHTS: &[(&str, u32)] = &[
    // single terms
    ("articulation", 3),
    ("phonology", 3),
    ("apraxia", 3),
    ("aac", 3),
    ("fluency", 2),
    ("expressive", 2),
    ("receptive", 2),
    ("sensory", 2),
    ("motor", 2),
    ("regulation", 2),
    ("social", 2),
    ("speech", 2),
    ("language", 2),
    ("attention", 2),
    // multi-word phrases
    ("fine motor", 3),
    ("gross motor", 3),
    ("expressive language", 3),
    ("receptive language", 3),
    ("sensory integration", 3),
    ("joint attention", 3),
    ("emotional regulation", 3),
    ("social skills", 2),
    ("turn taking", 2),
];

/// Description markers that earn the flat evidence bonus.
pub const EVIDENCE_MARKERS: &[&str] = &["evidence-based", "research", "study", "effective"];

pub const FOUNDATIONAL_MARKERS: &[&str] = &[
    "foundational",
    "basic",
    "beginner",
    "introductory",
    "early",
    "prerequisite",
];

pub const ADVANCED_MARKERS: &[&str] = &[
    "advanced",
    "complex",
    "refinement",
    "mastery",
    "higher-level",
    "generalization",
];

/// Age brackets for personalization: (min age inclusive, max age inclusive,
/// keywords whose presence in strategy text marks an age match).
pub const AGE_BRACKETS: &[(u32, u32, &[&str])] = &[
    (0, 4, &["toddler", "preschool", "early childhood", "play-based"]),
    (5, 11, &["school-age", "elementary", "child", "children"]),
    (12, 17, &["adolescent", "teen", "teenager", "middle school", "high school"]),
    (18, u32::MAX, &["adult", "vocational", "independent living", "workplace"]),
];

/// Stopwords stripped from extracted key terms.
pub const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "will", "able", "when", "while", "then",
    "than", "them", "they", "their", "have", "has", "had", "been", "being", "into", "onto",
    "about", "during", "within", "using", "use", "uses", "each", "also", "such", "more", "most",
    "client", "goal", "goals", "therapy", "session", "sessions", "skills", "skill", "improve",
    "improves", "increase", "increases", "demonstrate", "demonstrates",
];

// ============================================================================
// Helpers
// ============================================================================

/// Case-insensitive "query contains any of these terms" (substring match,
/// the intent cascade's membership test).
pub fn contains_any(lower: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| lower.contains(t))
}

/// Whole-word occurrence count of `term` among lowercase `tokens`.
pub fn count_occurrences(tokens: &[&str], term: &str) -> usize {
    tokens.iter().filter(|t| **t == term).count()
}

/// Lowercase word tokens of a query, punctuation stripped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-' && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Importance multiplier for a key term (default 1).
pub fn term_weight(term: &str) -> u32 {
    DOMAIN_TERM_WEIGHTS
        .iter()
        .find(|(t, _)| *t == term)
        .map(|(_, w)| *w)
        .unwrap_or(1)
}
