//! Response templates.
//!
//! Static, priority-ordered template tables, one per intent category.
//! Selection is a pure function of the data bag; rendering substitutes
//! `{{var}}` / `{{var.sub}}` tokens and deliberately leaves unresolved tokens
//! verbatim — a partial answer beats a hard failure.

use std::sync::LazyLock;

use serde_json::Value;

static TOKEN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\{\{(\w+)(?:\.(\w+))?\}\}").expect("template token regex is valid")
});

pub struct ResponseTemplate {
    pub template: &'static str,
    pub condition: fn(&Value) -> bool,
    pub priority: i32,
    pub follow_ups: &'static [&'static str],
}

/// Pick the highest-priority template whose condition holds. Ties keep the
/// first declared entry; nothing matching falls back to the general template.
pub fn select_template<'a>(
    templates: &'a [ResponseTemplate],
    data: &Value,
) -> &'a ResponseTemplate {
    let mut best: Option<&ResponseTemplate> = None;
    for t in templates {
        if !(t.condition)(data) {
            continue;
        }
        if best.map_or(true, |b| t.priority > b.priority) {
            best = Some(t);
        }
    }
    best.unwrap_or(&GENERAL_FALLBACK)
}

/// Substitute `{{var}}` and `{{var.sub}}` tokens via direct (one-level)
/// lookup in the data bag. Unresolved tokens stay as-is.
pub fn render_template(template: &ResponseTemplate, data: &Value) -> String {
    TOKEN_RE
        .replace_all(template.template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            let resolved = match caps.get(2) {
                Some(sub) => data.get(key).and_then(|v| v.get(sub.as_str())),
                None => data.get(key),
            };
            match resolved {
                Some(value) => value_text(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Conditions
// ============================================================================

fn always(_: &Value) -> bool {
    true
}

fn num(data: &Value, key: &str) -> f64 {
    data.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn text<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn high_utilization(data: &Value) -> bool {
    num(data, "utilizationNumeric") >= 90.0
}

fn strong_progress(data: &Value) -> bool {
    num(data, "overallNumeric") >= 75.0
}

fn has_strategies(data: &Value) -> bool {
    num(data, "count") > 0.0
}

fn no_strategies(data: &Value) -> bool {
    num(data, "count") == 0.0
}

fn has_both_sections(data: &Value) -> bool {
    text(data, "budgetSection").is_some() && text(data, "progressSection").is_some()
}

fn has_topic_summary(data: &Value) -> bool {
    text(data, "topic").is_some() && text(data, "summary").is_some()
}

fn has_topic(data: &Value) -> bool {
    text(data, "topic").is_some()
}

fn is_timeout(data: &Value) -> bool {
    text(data, "category") == Some("timeout")
}

fn is_network(data: &Value) -> bool {
    text(data, "category") == Some("network")
}

fn is_not_found(data: &Value) -> bool {
    text(data, "category") == Some("not_found")
}

fn is_unauthorized(data: &Value) -> bool {
    text(data, "category") == Some("unauthorized")
}

// ============================================================================
// Template tables
// ============================================================================

/// The single always-true fallback (priority 0).
pub static GENERAL_FALLBACK: ResponseTemplate = ResponseTemplate {
    template: "I can help you analyze therapy budgets, track goal progress, recommend \
               strategies, and summarize practice statistics. Try asking \"How much budget is \
               remaining?\" or \"How is progress toward goals?\"",
    condition: always,
    priority: 0,
    follow_ups: &[
        "How much budget is remaining?",
        "How is progress toward goals?",
        "What strategies are available?",
    ],
};

pub static BUDGET_TEMPLATES: &[ResponseTemplate] = &[
    ResponseTemplate {
        template: "The budget is nearly exhausted: {{utilizationRate}}% used, with \
                   ${{remaining}} of ${{totalBudget}} left. Spending is {{trendWord}}.",
        condition: high_utilization,
        priority: 10,
        follow_ups: &[
            "When will the budget run out?",
            "Which categories are using the most funds?",
        ],
    },
    ResponseTemplate {
        template: "The total budget is ${{totalBudget}} with ${{totalSpent}} spent so far, \
                   leaving ${{remaining}} ({{utilizationRate}}% utilization). Spending is \
                   currently {{trendWord}}.",
        condition: always,
        priority: 1,
        follow_ups: &[
            "How much budget is remaining?",
            "What's the spending forecast?",
        ],
    },
];

pub static PROGRESS_TEMPLATES: &[ResponseTemplate] = &[
    ResponseTemplate {
        template: "Progress is {{assessment}}: {{overallProgress}}% overall with \
                   {{attendanceRate}}% attendance across {{sessionsCompleted}} completed \
                   sessions. Keep up the current approach.",
        condition: strong_progress,
        priority: 10,
        follow_ups: &[
            "Which goals are closest to completion?",
            "How are milestones tracking?",
        ],
    },
    ResponseTemplate {
        template: "Overall progress stands at {{overallProgress}}% ({{assessment}}). \
                   Attendance is {{attendanceRate}}% across {{sessionsCompleted}} completed \
                   sessions.",
        condition: always,
        priority: 1,
        follow_ups: &["How is each goal progressing?", "How is attendance?"],
    },
];

pub static STRATEGY_TEMPLATES: &[ResponseTemplate] = &[
    ResponseTemplate {
        template: "There are {{count}} strategies in the catalog. Options include \
                   {{examples}}. Select a client or goal for tailored recommendations.",
        condition: has_strategies,
        priority: 10,
        follow_ups: &[
            "What strategies suit this client?",
            "Which strategies fit a specific goal?",
        ],
    },
    ResponseTemplate {
        template: "No strategies are available in the catalog yet.",
        condition: no_strategies,
        priority: 5,
        follow_ups: &[],
    },
];

pub static COMBINED_TEMPLATES: &[ResponseTemplate] = &[
    ResponseTemplate {
        template: "{{budgetSection}}\n\n{{progressSection}}\n\n{{correlation}}",
        condition: has_both_sections,
        priority: 10,
        follow_ups: &[
            "How much budget is remaining?",
            "Which goals need attention?",
        ],
    },
    ResponseTemplate {
        template: "{{availableSection}}\n\nPart of the picture is unavailable right now: \
                   {{unavailableNote}}",
        condition: always,
        priority: 1,
        follow_ups: &["Try the full overview again"],
    },
];

pub static GENERAL_TEMPLATES: &[ResponseTemplate] = &[
    ResponseTemplate {
        template: "Here's what I can share about {{topic}}: {{summary}}",
        condition: has_topic_summary,
        priority: 10,
        follow_ups: &[
            "How much budget is remaining?",
            "How is progress toward goals?",
        ],
    },
    ResponseTemplate {
        template: "I can help with questions about {{topic}}. Pick a client to get specific \
                   numbers, or ask about budgets, progress, or strategies.",
        condition: has_topic,
        priority: 5,
        follow_ups: &[
            "How much budget is remaining?",
            "How is progress toward goals?",
            "What strategies are available?",
        ],
    },
];

pub static ERROR_TEMPLATES: &[ResponseTemplate] = &[
    ResponseTemplate {
        template: "The data service is responding slower than expected. Please try again in a \
                   moment.",
        condition: is_timeout,
        priority: 10,
        follow_ups: &[],
    },
    ResponseTemplate {
        template: "I couldn't reach the data service. Please check your connection and try \
                   again.",
        condition: is_network,
        priority: 10,
        follow_ups: &[],
    },
    ResponseTemplate {
        template: "I couldn't find the records needed for that. The client or plan may not \
                   exist yet.",
        condition: is_not_found,
        priority: 10,
        follow_ups: &[],
    },
    ResponseTemplate {
        template: "I'm not able to access that data right now. Please check your permissions \
                   and try again.",
        condition: is_unauthorized,
        priority: 10,
        follow_ups: &[],
    },
    ResponseTemplate {
        template: "Something went wrong while preparing that answer. Please try rephrasing \
                   your question.",
        condition: always,
        priority: 1,
        follow_ups: &[],
    },
];
