//! Intent classification.
//!
//! A deterministic, ordered cascade of keyword-membership tests; the first
//! category that matches wins. The cascade is a table of builder functions so
//! priority order and term lists stay declarative and testable rather than
//! buried in control flow. Statistics and combined-insights sit ahead of the
//! budget test so "overview of budget and progress" is not swallowed by the
//! plain budget category.

use serde::{Deserialize, Serialize};

use crate::topics::detect_topic_opt;
use crate::types::QueryContext;
use crate::vocabulary::{
    contains_any, BUDGET_FORECAST_TERMS, BUDGET_REMAINING_TERMS, BUDGET_TERMS,
    BUDGET_UTILIZATION_TERMS, COMBINED_TERMS, PROGRESS_ATTENDANCE_TERMS, PROGRESS_GOAL_TERMS,
    PROGRESS_MILESTONE_TERMS, PROGRESS_TERMS, STATS_TERMS, STRATEGY_FOR_CLIENT_TERMS,
    STRATEGY_FOR_GOAL_TERMS, STRATEGY_TERMS, VISUALIZATION_TERMS, VIZ_BUDGET_SECONDARY,
    VIZ_PROGRESS_SECONDARY,
};

// ============================================================================
// Intent types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BudgetQuery {
    Remaining,
    Forecast,
    Utilization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProgressQuery {
    Goals,
    Milestones,
    Attendance,
    Overall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyQuery {
    ForGoal,
    ForClient,
    General,
}

/// Closed set of structured intents. Exactly one variant per query; each
/// specific-query enum is only valid inside its owning variant, which the
/// type system enforces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryIntent {
    BudgetAnalysis {
        client_id: Option<i64>,
        specific: Option<BudgetQuery>,
    },
    ProgressTracking {
        client_id: Option<i64>,
        specific: Option<ProgressQuery>,
    },
    StrategyRecommendation {
        client_id: Option<i64>,
        goal_id: Option<i64>,
        specific: StrategyQuery,
    },
    CombinedInsights {
        client_id: Option<i64>,
    },
    DatabaseStatistics,
    GeneralQuestion {
        topic: Option<String>,
    },
}

impl QueryIntent {
    /// Lowercased tag recorded as `last_topic` after dispatch.
    pub fn tag(&self) -> &'static str {
        match self {
            QueryIntent::BudgetAnalysis { .. } => "budget_analysis",
            QueryIntent::ProgressTracking { .. } => "progress_tracking",
            QueryIntent::StrategyRecommendation { .. } => "strategy_recommendation",
            QueryIntent::CombinedInsights { .. } => "combined_insights",
            QueryIntent::DatabaseStatistics => "database_statistics",
            QueryIntent::GeneralQuestion { .. } => "general_question",
        }
    }

    /// Intents that cannot be answered without an active client bound.
    pub fn requires_client(&self) -> bool {
        match self {
            QueryIntent::BudgetAnalysis { .. }
            | QueryIntent::ProgressTracking { .. }
            | QueryIntent::CombinedInsights { .. } => true,
            QueryIntent::StrategyRecommendation { specific, .. } => {
                *specific != StrategyQuery::General
            }
            QueryIntent::DatabaseStatistics | QueryIntent::GeneralQuestion { .. } => false,
        }
    }
}

// ============================================================================
// Cascade
// ============================================================================

/// One stage of the cascade: returns `Some(intent)` when its category matches,
/// `None` to fall through to the next stage.
type IntentBuilder = fn(&str, &QueryContext) -> Option<QueryIntent>;

/// Evaluation order is the category priority.
const CASCADE: &[IntentBuilder] = &[
    build_statistics,
    build_combined,
    build_budget,
    build_progress,
    build_strategy,
    build_visualization,
];

/// Classify a query. Client/goal ids are bound from the active context only —
/// entity-to-id resolution is the conversation manager's job, never the
/// parser's.
pub fn parse_intent(query: &str, ctx: &QueryContext) -> QueryIntent {
    let lower = query.to_lowercase();

    for builder in CASCADE {
        if let Some(intent) = builder(&lower, ctx) {
            return intent;
        }
    }

    QueryIntent::GeneralQuestion {
        topic: detect_topic_opt(query),
    }
}

/// First-match-wins second-level refinement over disjoint keyword sets.
fn match_specific<T: Copy>(lower: &str, table: &[(&[&str], T)]) -> Option<T> {
    table
        .iter()
        .find(|(terms, _)| contains_any(lower, terms))
        .map(|(_, value)| *value)
}

fn build_statistics(lower: &str, _ctx: &QueryContext) -> Option<QueryIntent> {
    contains_any(lower, STATS_TERMS).then_some(QueryIntent::DatabaseStatistics)
}

fn build_combined(lower: &str, ctx: &QueryContext) -> Option<QueryIntent> {
    let explicit = contains_any(lower, COMBINED_TERMS);
    let spans_both = contains_any(lower, BUDGET_TERMS) && contains_any(lower, PROGRESS_TERMS);
    (explicit || spans_both).then_some(QueryIntent::CombinedInsights {
        client_id: ctx.active_client_id,
    })
}

fn build_budget(lower: &str, ctx: &QueryContext) -> Option<QueryIntent> {
    if !contains_any(lower, BUDGET_TERMS) {
        return None;
    }
    let specific = match_specific(
        lower,
        &[
            (BUDGET_REMAINING_TERMS, BudgetQuery::Remaining),
            (BUDGET_FORECAST_TERMS, BudgetQuery::Forecast),
            (BUDGET_UTILIZATION_TERMS, BudgetQuery::Utilization),
        ],
    );
    Some(QueryIntent::BudgetAnalysis {
        client_id: ctx.active_client_id,
        specific,
    })
}

fn build_progress(lower: &str, ctx: &QueryContext) -> Option<QueryIntent> {
    if !contains_any(lower, PROGRESS_TERMS) {
        return None;
    }
    let specific = match_specific(
        lower,
        &[
            (PROGRESS_MILESTONE_TERMS, ProgressQuery::Milestones),
            (PROGRESS_ATTENDANCE_TERMS, ProgressQuery::Attendance),
            (PROGRESS_GOAL_TERMS, ProgressQuery::Goals),
        ],
    );
    Some(QueryIntent::ProgressTracking {
        client_id: ctx.active_client_id,
        specific,
    })
}

fn build_strategy(lower: &str, ctx: &QueryContext) -> Option<QueryIntent> {
    if !contains_any(lower, STRATEGY_TERMS) {
        return None;
    }
    let specific = match_specific(
        lower,
        &[
            (STRATEGY_FOR_GOAL_TERMS, StrategyQuery::ForGoal),
            (STRATEGY_FOR_CLIENT_TERMS, StrategyQuery::ForClient),
        ],
    )
    .unwrap_or(StrategyQuery::General);
    Some(QueryIntent::StrategyRecommendation {
        client_id: ctx.active_client_id,
        goal_id: ctx.active_goal_id,
        specific,
    })
}

/// Visualization requests carry no intent of their own — they re-map onto the
/// analysis the user wants drawn, or fall through to the general path.
fn build_visualization(lower: &str, ctx: &QueryContext) -> Option<QueryIntent> {
    if !contains_any(lower, VISUALIZATION_TERMS) {
        return None;
    }
    if contains_any(lower, VIZ_BUDGET_SECONDARY) {
        return Some(QueryIntent::BudgetAnalysis {
            client_id: ctx.active_client_id,
            specific: Some(BudgetQuery::Utilization),
        });
    }
    if contains_any(lower, VIZ_PROGRESS_SECONDARY) {
        return Some(QueryIntent::ProgressTracking {
            client_id: ctx.active_client_id,
            specific: Some(ProgressQuery::Overall),
        });
    }
    None
}
