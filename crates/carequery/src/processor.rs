//! Query orchestrator.
//!
//! One async entry point, [`QueryProcessor::process_query`], runs the fixed
//! pipeline: extract entities, draft memory updates, resolve references,
//! classify intent, short-circuit on missing context, dispatch to the intent's
//! handler, then merge the handler's memory diff over the draft. Service
//! failures never escape: the final catch converts any error into a degraded
//! response built from the failure taxonomy.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::conversation::{merge_recent_entities, refresh_carryover, resolve_references};
use crate::entities::extract_entities;
use crate::error::{FailureKind, RECOVERY_FOLLOW_UPS};
use crate::intent::{parse_intent, BudgetQuery, ProgressQuery, QueryIntent, StrategyQuery};
use crate::services::{
    BudgetAnalysis, BudgetDataService, KnowledgeService, ProgressAnalysis, ProgressDataService,
    Strategy, StrategyDataService,
};
use crate::templates::{
    render_template, select_template, BUDGET_TEMPLATES, COMBINED_TEMPLATES, ERROR_TEMPLATES,
    GENERAL_FALLBACK, GENERAL_TEMPLATES, PROGRESS_TEMPLATES, STRATEGY_TEMPLATES,
};
use crate::types::{
    AgentResponse, ExtractedEntity, MemoryUpdates, QueryContext, VisualizationHint,
};

const MAX_FOLLOW_UPS: usize = 3;

pub struct QueryProcessor {
    budget: Arc<dyn BudgetDataService>,
    progress: Arc<dyn ProgressDataService>,
    strategies: Arc<dyn StrategyDataService>,
    knowledge: Arc<dyn KnowledgeService>,
    config: AgentConfig,
}

impl QueryProcessor {
    pub fn new(
        budget: Arc<dyn BudgetDataService>,
        progress: Arc<dyn ProgressDataService>,
        strategies: Arc<dyn StrategyDataService>,
        knowledge: Arc<dyn KnowledgeService>,
        config: AgentConfig,
    ) -> Self {
        Self {
            budget,
            progress,
            strategies,
            knowledge,
            config,
        }
    }

    /// Answer a query. Infallible in practice: handler errors are caught here
    /// and converted into a degraded response with recovery follow-ups and a
    /// memory reset, so one bad turn never poisons the next.
    pub async fn process_query(&self, query: &str, ctx: &QueryContext) -> Result<AgentResponse> {
        match self.process_inner(query, ctx).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(error = %err, "query handling failed, degrading");
                Ok(degraded_response(&err))
            }
        }
    }

    async fn process_inner(&self, query: &str, ctx: &QueryContext) -> Result<AgentResponse> {
        let memory = ctx.conversation_memory.clone().unwrap_or_default();
        let entities = extract_entities(query);

        let mut draft = MemoryUpdates {
            last_query: Some(query.to_string()),
            ..Default::default()
        };
        if !entities.is_empty() {
            draft.recent_entities = Some(merge_recent_entities(&memory.recent_entities, &entities));
            draft.context_carryover =
                Some(refresh_carryover(&memory.context_carryover, &entities));
        }

        let history = recent_history(ctx, self.config.history_window);
        let resolved = resolve_references(query, history, &memory);
        if resolved != query {
            debug!(original = query, resolved = %resolved, "rewrote query references");
        }

        let intent = parse_intent(&resolved, ctx);
        draft.last_topic = Some(intent.tag().to_string());
        info!(intent = intent.tag(), "dispatching query");

        if intent.requires_client() && ctx.active_client_id.is_none() {
            return Ok(finish(clarification_response(), draft, entities));
        }

        let response = match &intent {
            QueryIntent::BudgetAnalysis { client_id, specific } => {
                self.handle_budget(client_id.unwrap_or_default(), *specific)
                    .await?
            }
            QueryIntent::ProgressTracking { client_id, specific } => {
                self.handle_progress(client_id.unwrap_or_default(), *specific)
                    .await?
            }
            QueryIntent::StrategyRecommendation {
                client_id,
                goal_id,
                specific,
            } => self.handle_strategy(*client_id, *goal_id, *specific).await?,
            QueryIntent::CombinedInsights { client_id } => {
                self.handle_combined(client_id.unwrap_or_default()).await?
            }
            QueryIntent::DatabaseStatistics => self.handle_statistics().await?,
            QueryIntent::GeneralQuestion { topic } => self.handle_general(topic.as_deref()).await,
        };

        Ok(finish(response, draft, entities))
    }

    // ------------------------------------------------------------------
    // Budget
    // ------------------------------------------------------------------

    async fn handle_budget(
        &self,
        client_id: i64,
        specific: Option<BudgetQuery>,
    ) -> Result<AgentResponse> {
        let analysis = self.budget.get_budget_analysis(client_id).await?;
        let data = serde_json::to_value(&analysis)?;

        let response = match specific {
            Some(BudgetQuery::Remaining) => {
                let content = format!(
                    "There is ${} remaining out of the total budget of ${}, with ${} spent so far ({}% utilization).",
                    money(analysis.remaining),
                    money(analysis.total_budget),
                    money(analysis.total_spent),
                    pct(analysis.utilization_rate),
                );
                AgentResponse::new(content, 0.9)
                    .with_hint(VisualizationHint::PieChart)
                    .with_follow_ups(follow_ups(&[
                        "What's the spending forecast?",
                        "Which categories are using the most funds?",
                    ]))
            }
            Some(BudgetQuery::Forecast) => {
                let mut content = format!(
                    "At the current pace, the budget is forecast to be depleted around {}.",
                    analysis.forecasted_depletion.format("%B %-d, %Y"),
                );
                if let Some(velocity) = analysis.spending_velocity {
                    content.push_str(&format!(
                        " Spending is running at about ${} per week.",
                        money(velocity)
                    ));
                }
                AgentResponse::new(content, 0.9)
                    .with_hint(VisualizationHint::LineChart)
                    .with_follow_ups(follow_ups(&[
                        "How much budget is remaining?",
                        "How can spending be slowed down?",
                    ]))
            }
            Some(BudgetQuery::Utilization) => {
                let mut content = format!(
                    "Budget utilization is {}%: ${} of ${} spent.",
                    pct(analysis.utilization_rate),
                    money(analysis.total_spent),
                    money(analysis.total_budget),
                );
                if let Some(patterns) = &analysis.spending_patterns {
                    if !patterns.high_usage_categories.is_empty() {
                        content.push_str(&format!(
                            " The heaviest categories are {}.",
                            patterns.high_usage_categories.join(", ")
                        ));
                    }
                }
                AgentResponse::new(content, 0.9)
                    .with_hint(VisualizationHint::BarChart)
                    .with_follow_ups(follow_ups(&[
                        "How much budget is remaining?",
                        "When will the budget run out?",
                    ]))
            }
            None => {
                let trend_word = trend_word(&analysis);
                let bag = json!({
                    "totalBudget": money(analysis.total_budget),
                    "totalSpent": money(analysis.total_spent),
                    "remaining": money(analysis.remaining),
                    "utilizationRate": pct(analysis.utilization_rate),
                    "utilizationNumeric": analysis.utilization_rate,
                    "trendWord": trend_word,
                });
                let template = select_template(BUDGET_TEMPLATES, &bag);
                let mut ups: Vec<&str> = template.follow_ups.to_vec();
                if trend_word == "accelerating" {
                    ups.push("Why is spending accelerating?");
                }
                AgentResponse::new(render_template(template, &bag), 0.9)
                    .with_hint(VisualizationHint::BarChart)
                    .with_follow_ups(follow_ups(&ups))
            }
        };

        Ok(response.with_data(data))
    }

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    async fn handle_progress(
        &self,
        client_id: i64,
        specific: Option<ProgressQuery>,
    ) -> Result<AgentResponse> {
        let analysis = self.progress.get_progress_analysis(client_id).await?;
        let data = serde_json::to_value(&analysis)?;

        let response = match specific {
            Some(ProgressQuery::Milestones) => {
                let total: usize = analysis.goal_progress.iter().map(|g| g.milestones.len()).sum();
                let completed: usize = analysis
                    .goal_progress
                    .iter()
                    .flat_map(|g| &g.milestones)
                    .filter(|m| m.completed)
                    .count();
                let content = format!(
                    "{completed} of {total} milestones are complete across {} goals.",
                    analysis.goal_progress.len()
                );
                AgentResponse::new(content, 0.9).with_follow_ups(follow_ups(&[
                    "Which goals are closest to completion?",
                    "How is overall progress?",
                ]))
            }
            Some(ProgressQuery::Attendance) => {
                let content = format!(
                    "Attendance is {}%, with {} sessions completed and {} cancelled.",
                    pct(analysis.attendance_rate),
                    analysis.sessions_completed,
                    analysis.sessions_cancelled,
                );
                AgentResponse::new(content, 0.9).with_follow_ups(follow_ups(&[
                    "How is overall progress?",
                    "How are milestones tracking?",
                ]))
            }
            Some(ProgressQuery::Goals) => {
                let lines: Vec<String> = analysis
                    .goal_progress
                    .iter()
                    .map(|g| format!("{} is at {}%", g.goal_title, pct(g.progress)))
                    .collect();
                let content = if lines.is_empty() {
                    "No goals are being tracked yet.".to_string()
                } else {
                    format!("Goal progress: {}.", lines.join("; "))
                };
                AgentResponse::new(content, 0.9).with_follow_ups(follow_ups(&[
                    "How are milestones tracking?",
                    "What strategies suit this client?",
                ]))
            }
            Some(ProgressQuery::Overall) | None => {
                let bag = json!({
                    "overallProgress": pct(analysis.overall_progress),
                    "overallNumeric": analysis.overall_progress,
                    "assessment": assess_progress(analysis.overall_progress),
                    "attendanceRate": pct(analysis.attendance_rate),
                    "sessionsCompleted": analysis.sessions_completed,
                });
                let template = select_template(PROGRESS_TEMPLATES, &bag);
                AgentResponse::new(render_template(template, &bag), 0.9)
                    .with_follow_ups(follow_ups(template.follow_ups))
            }
        };

        Ok(response.with_hint(VisualizationHint::ProgressBars).with_data(data))
    }

    // ------------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------------

    async fn handle_strategy(
        &self,
        client_id: Option<i64>,
        goal_id: Option<i64>,
        specific: StrategyQuery,
    ) -> Result<AgentResponse> {
        match (specific, goal_id, client_id) {
            (StrategyQuery::ForGoal, Some(goal_id), _) => {
                let recs = self
                    .strategies
                    .get_recommended_strategies_for_goal(goal_id)
                    .await?;
                if recs.is_empty() {
                    return Ok(AgentResponse::new(
                        "No strategies are recommended for this goal yet.",
                        0.9,
                    )
                    .with_follow_ups(follow_ups(&["What strategies are available?"])));
                }
                let data = serde_json::to_value(&recs)?;
                Ok(AgentResponse::new(
                    format!(
                        "For this goal, the most relevant strategies are {}.",
                        strategy_names(&recs, 5)
                    ),
                    0.9,
                )
                .with_data(data)
                .with_follow_ups(follow_ups(&[
                    "How is progress toward this goal?",
                    "What strategies suit this client?",
                ])))
            }
            // A goal-scoped ask without a bound goal widens to the client.
            (StrategyQuery::ForGoal, None, Some(client_id))
            | (StrategyQuery::ForClient, _, Some(client_id)) => {
                let by_goal = self
                    .strategies
                    .get_recommended_strategies_for_client(client_id)
                    .await?;
                if by_goal.is_empty() {
                    return Ok(AgentResponse::new(
                        "This client has no goals with strategy recommendations yet.",
                        0.9,
                    )
                    .with_follow_ups(follow_ups(&["What strategies are available?"])));
                }
                let mut lines: Vec<String> = by_goal
                    .iter()
                    .map(|(goal, strategies)| {
                        format!("for \"{goal}\": {}", strategy_names(strategies, 3))
                    })
                    .collect();
                lines.sort();
                let data = serde_json::to_value(&by_goal)?;
                Ok(AgentResponse::new(
                    format!("Recommended strategies {}.", lines.join("; ")),
                    0.9,
                )
                .with_data(data)
                .with_follow_ups(follow_ups(&[
                    "Which strategies fit a specific goal?",
                    "How is progress toward goals?",
                ])))
            }
            _ => {
                let catalog = self.strategies.get_all_strategies().await?;
                let bag = json!({
                    "count": catalog.len(),
                    "examples": strategy_names(&catalog, 3),
                });
                let template = select_template(STRATEGY_TEMPLATES, &bag);
                let data = serde_json::to_value(&catalog)?;
                Ok(
                    AgentResponse::new(render_template(template, &bag), 0.9)
                        .with_data(data)
                        .with_follow_ups(follow_ups(template.follow_ups)),
                )
            }
        }
    }

    // ------------------------------------------------------------------
    // Combined insights
    // ------------------------------------------------------------------

    async fn handle_combined(&self, client_id: i64) -> Result<AgentResponse> {
        let (budget, progress) = futures::join!(
            self.budget.get_budget_analysis(client_id),
            self.progress.get_progress_analysis(client_id),
        );

        let (bag, confidence, data) = match (budget, progress) {
            (Ok(budget), Ok(progress)) => {
                let bag = json!({
                    "budgetSection": budget_section(&budget),
                    "progressSection": progress_section(&progress),
                    "correlation": correlation(&budget, &progress),
                });
                let data = json!({
                    "budget": serde_json::to_value(&budget)?,
                    "progress": serde_json::to_value(&progress)?,
                });
                (bag, 0.9, data)
            }
            (Ok(budget), Err(err)) => {
                warn!(error = %err, "progress side of combined view unavailable");
                let bag = json!({
                    "availableSection": budget_section(&budget),
                    "unavailableNote": failure_message(&err),
                });
                (bag, 0.6, serde_json::to_value(&budget)?)
            }
            (Err(err), Ok(progress)) => {
                warn!(error = %err, "budget side of combined view unavailable");
                let bag = json!({
                    "availableSection": progress_section(&progress),
                    "unavailableNote": failure_message(&err),
                });
                (bag, 0.6, serde_json::to_value(&progress)?)
            }
            (Err(err), Err(other)) => {
                warn!(error = %other, "both sides of combined view failed");
                return Err(err);
            }
        };

        let template = select_template(COMBINED_TEMPLATES, &bag);
        Ok(AgentResponse::new(render_template(template, &bag), confidence)
            .with_hint(VisualizationHint::BarChart)
            .with_data(data)
            .with_follow_ups(follow_ups(template.follow_ups)))
    }

    // ------------------------------------------------------------------
    // Statistics and general questions
    // ------------------------------------------------------------------

    async fn handle_statistics(&self) -> Result<AgentResponse> {
        let stats = self.knowledge.get_database_statistics().await?;
        let content = format!(
            "The practice has {} clients ({} active) across {} budget plans, with average budget utilization of {}%.",
            stats.total_clients,
            stats.active_clients,
            stats.total_budget_plans,
            pct(stats.average_utilization),
        );
        let data = serde_json::to_value(&stats)?;
        Ok(AgentResponse::new(content, 0.9)
            .with_hint(VisualizationHint::Table)
            .with_data(data)
            .with_follow_ups(follow_ups(&[
                "How does utilization break down by category?",
                "What is the client age distribution?",
            ])))
    }

    async fn handle_general(&self, topic: Option<&str>) -> AgentResponse {
        let Some(topic) = topic else {
            return AgentResponse::new(render_template(&GENERAL_FALLBACK, &json!({})), 0.5)
                .with_follow_ups(follow_ups(GENERAL_FALLBACK.follow_ups));
        };

        let bag = match self.knowledge.get_topic_info(topic).await {
            Ok(Some(info)) => json!({"topic": info.topic, "summary": info.summary}),
            Ok(None) => json!({"topic": topic}),
            Err(err) => {
                // Background info is optional; answer from the topic alone.
                warn!(error = %err, topic, "topic info lookup failed");
                json!({"topic": topic})
            }
        };
        let template = select_template(GENERAL_TEMPLATES, &bag);
        AgentResponse::new(render_template(template, &bag), 0.7)
            .with_follow_ups(follow_ups(template.follow_ups))
    }
}

// ============================================================================
// Response assembly
// ============================================================================

fn finish(
    response: AgentResponse,
    draft: MemoryUpdates,
    entities: Vec<ExtractedEntity>,
) -> AgentResponse {
    let mut response = response;
    let handler_updates = response.memory_updates.take().unwrap_or_default();
    response.memory_updates = Some(draft.overlay(handler_updates));
    response.detected_entities = entities;
    response
}

fn clarification_response() -> AgentResponse {
    AgentResponse::new(
        "I need to know which client you mean. Please select a client, then ask again.",
        0.8,
    )
    .with_follow_ups(follow_ups(&[
        "What strategies are available?",
        "Show practice statistics",
    ]))
}

/// Built when a handler error reaches the orchestrator: taxonomy-selected
/// apology, low confidence, and a memory reset so the broken context is not
/// carried into the next turn.
fn degraded_response(err: &anyhow::Error) -> AgentResponse {
    AgentResponse::new(failure_message(err), 0.45)
        .with_follow_ups(follow_ups(RECOVERY_FOLLOW_UPS))
        .with_memory_updates(MemoryUpdates {
            last_topic: Some("error_recovery".into()),
            last_query: Some(String::new()),
            ..Default::default()
        })
}

fn failure_message(err: &anyhow::Error) -> String {
    let kind = FailureKind::classify(err);
    let bag = json!({"category": kind.as_str()});
    render_template(select_template(ERROR_TEMPLATES, &bag), &bag)
}

fn recent_history(ctx: &QueryContext, window: usize) -> &[crate::types::Message] {
    let start = ctx.conversation_history.len().saturating_sub(window);
    &ctx.conversation_history[start..]
}

fn follow_ups<S: AsRef<str>>(candidates: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in candidates {
        let c = c.as_ref();
        if !out.iter().any(|existing| existing == c) {
            out.push(c.to_string());
        }
        if out.len() == MAX_FOLLOW_UPS {
            break;
        }
    }
    out
}

// ============================================================================
// Narration helpers
// ============================================================================

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn pct(value: f64) -> String {
    format!("{value:.1}")
}

fn trend_word(analysis: &BudgetAnalysis) -> &'static str {
    let trend = analysis
        .spending_patterns
        .as_ref()
        .map(|p| p.trend.to_lowercase())
        .unwrap_or_default();
    match trend.as_str() {
        "increasing" => "accelerating",
        "decreasing" => "decelerating",
        "fluctuating" => "fluctuating",
        _ => "stable",
    }
}

fn assess_progress(overall: f64) -> &'static str {
    if overall >= 90.0 {
        "excellent"
    } else if overall >= 75.0 {
        "very good"
    } else if overall >= 50.0 {
        "good"
    } else if overall >= 25.0 {
        "showing some progress, though there is room for improvement"
    } else {
        "limited; additional interventions may be needed"
    }
}

fn budget_section(analysis: &BudgetAnalysis) -> String {
    format!(
        "Budget: ${} of ${} spent ({}% utilization), leaving ${}.",
        money(analysis.total_spent),
        money(analysis.total_budget),
        pct(analysis.utilization_rate),
        money(analysis.remaining),
    )
}

fn progress_section(analysis: &ProgressAnalysis) -> String {
    format!(
        "Progress: {}% overall with {}% attendance across {} completed sessions.",
        pct(analysis.overall_progress),
        pct(analysis.attendance_rate),
        analysis.sessions_completed,
    )
}

fn correlation(budget: &BudgetAnalysis, progress: &ProgressAnalysis) -> &'static str {
    let gap = budget.utilization_rate - progress.overall_progress;
    if gap > 15.0 {
        "Spending is running ahead of progress; it may be worth reviewing which services are delivering results."
    } else if gap < -15.0 {
        "Progress is outpacing spending, which suggests the current plan is cost-effective."
    } else {
        "Spending and progress are tracking closely; the plan appears on course."
    }
}

fn strategy_names(strategies: &[Strategy], limit: usize) -> String {
    strategies
        .iter()
        .take(limit)
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use crate::services::{
        DatabaseStatistics, GoalProgress, Milestone, ServiceError, SpendingPatterns, TopicInfo,
    };
    use crate::types::EntityKind;

    // ------------------------------------------------------------------
    // Stub services
    // ------------------------------------------------------------------

    struct StubBudget {
        analysis: Option<BudgetAnalysis>,
        calls: AtomicUsize,
    }

    impl StubBudget {
        fn ok(analysis: BudgetAnalysis) -> Arc<Self> {
            Arc::new(Self {
                analysis: Some(analysis),
                calls: AtomicUsize::new(0),
            })
        }

        fn timing_out() -> Arc<Self> {
            Arc::new(Self {
                analysis: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BudgetDataService for StubBudget {
        async fn get_budget_analysis(&self, _client_id: i64) -> Result<BudgetAnalysis> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.analysis {
                Some(a) => Ok(a.clone()),
                None => Err(ServiceError::Timeout("budget analysis".into()).into()),
            }
        }
    }

    struct StubProgress {
        analysis: Option<ProgressAnalysis>,
    }

    #[async_trait]
    impl ProgressDataService for StubProgress {
        async fn get_progress_analysis(&self, _client_id: i64) -> Result<ProgressAnalysis> {
            match &self.analysis {
                Some(a) => Ok(a.clone()),
                None => Err(ServiceError::Network("progress analysis".into()).into()),
            }
        }
    }

    struct StubStrategies {
        catalog: Vec<Strategy>,
    }

    #[async_trait]
    impl StrategyDataService for StubStrategies {
        async fn get_all_strategies(&self) -> Result<Vec<Strategy>> {
            Ok(self.catalog.clone())
        }

        async fn get_recommended_strategies_for_goal(&self, _goal_id: i64) -> Result<Vec<Strategy>> {
            Ok(self.catalog.clone())
        }

        async fn get_recommended_strategies_for_client(
            &self,
            _client_id: i64,
        ) -> Result<HashMap<String, Vec<Strategy>>> {
            let mut map = HashMap::new();
            map.insert("Improve articulation".to_string(), self.catalog.clone());
            Ok(map)
        }
    }

    struct StubKnowledge;

    #[async_trait]
    impl KnowledgeService for StubKnowledge {
        async fn get_database_statistics(&self) -> Result<DatabaseStatistics> {
            Ok(DatabaseStatistics {
                total_clients: 42,
                active_clients: 30,
                total_budget_plans: 38,
                average_utilization: 61.5,
                category_averages: HashMap::new(),
                age_distribution: HashMap::new(),
            })
        }

        async fn get_topic_info(&self, topic: &str) -> Result<Option<TopicInfo>> {
            Ok(Some(TopicInfo {
                topic: topic.to_string(),
                summary: "tracked across all active plans".to_string(),
            }))
        }
    }

    fn sample_budget() -> BudgetAnalysis {
        BudgetAnalysis {
            total_budget: 1000.0,
            total_allocated: 900.0,
            total_spent: 400.0,
            remaining: 600.0,
            utilization_rate: 40.0,
            forecasted_depletion: Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).single().unwrap(),
            spending_by_category: None,
            spending_patterns: Some(SpendingPatterns {
                trend: "stable".into(),
                high_usage_categories: vec![],
                projected_overages: vec![],
            }),
            spending_velocity: Some(50.0),
        }
    }

    fn sample_progress() -> ProgressAnalysis {
        ProgressAnalysis {
            overall_progress: 72.0,
            attendance_rate: 92.0,
            sessions_completed: 23,
            sessions_cancelled: 2,
            goal_progress: vec![GoalProgress {
                goal_id: 1,
                goal_title: "Improve articulation".into(),
                progress: 72.0,
                milestones: vec![
                    Milestone {
                        milestone_id: 1,
                        title: "Initial sounds".into(),
                        completed: true,
                        last_rating: Some(4.0),
                    },
                    Milestone {
                        milestone_id: 2,
                        title: "Blends".into(),
                        completed: false,
                        last_rating: None,
                    },
                ],
            }],
        }
    }

    fn processor(budget: Arc<StubBudget>, progress: Option<ProgressAnalysis>) -> QueryProcessor {
        QueryProcessor::new(
            budget,
            Arc::new(StubProgress { analysis: progress }),
            Arc::new(StubStrategies {
                catalog: vec![
                    Strategy {
                        id: 1,
                        name: "Sound practice".into(),
                        description: Some("Daily drills".into()),
                        category: Some("Speech Therapy".into()),
                    },
                    Strategy {
                        id: 2,
                        name: "Visual schedules".into(),
                        description: None,
                        category: Some("Equipment".into()),
                    },
                ],
            }),
            Arc::new(StubKnowledge),
            AgentConfig::default(),
        )
    }

    fn ctx_with_client(id: i64) -> QueryContext {
        QueryContext {
            active_client_id: Some(id),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // Pipeline scenarios
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn missing_client_short_circuits_without_service_call() {
        let budget = StubBudget::ok(sample_budget());
        let p = processor(budget.clone(), Some(sample_progress()));

        let response = p
            .process_query("How much budget is remaining?", &QueryContext::default())
            .await
            .unwrap();

        assert!((0.8..=1.0).contains(&response.confidence));
        assert!(response.content.contains("select a client"));
        assert_eq!(budget.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remaining_budget_answer_carries_exact_amounts() {
        let p = processor(StubBudget::ok(sample_budget()), Some(sample_progress()));

        let response = p
            .process_query("How much budget is remaining?", &ctx_with_client(1))
            .await
            .unwrap();

        assert!(response.content.contains("600.00"));
        assert!(response.content.contains("1000.00"));
        let lower = response.content.to_lowercase();
        assert!(!lower.contains("forecast"));
        assert!(!lower.contains("deplet"));
        assert!(response.data.is_some());
    }

    #[tokio::test]
    async fn timeout_degrades_with_retry_language_and_memory_reset() {
        let p = processor(StubBudget::timing_out(), Some(sample_progress()));

        let response = p
            .process_query("How much budget is remaining?", &ctx_with_client(1))
            .await
            .unwrap();

        assert!(response.confidence <= 0.5);
        assert!(response.content.contains("slower than expected"));
        assert!(!response.suggested_follow_ups.is_empty());

        let updates = response.memory_updates.unwrap();
        assert_eq!(updates.last_topic.as_deref(), Some("error_recovery"));
        assert_eq!(updates.last_query.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn memory_draft_records_topic_entities_and_carryover() {
        let p = processor(StubBudget::ok(sample_budget()), Some(sample_progress()));

        let response = p
            .process_query("What's the budget for Jane Doe?", &ctx_with_client(1))
            .await
            .unwrap();

        assert!(response
            .detected_entities
            .iter()
            .any(|e| e.kind == EntityKind::ClientName && e.text == "Jane Doe"));

        let updates = response.memory_updates.unwrap();
        assert_eq!(updates.last_topic.as_deref(), Some("budget_analysis"));
        assert_eq!(updates.last_query.as_deref(), Some("What's the budget for Jane Doe?"));
        assert_eq!(
            updates.context_carryover.unwrap().subject.as_deref(),
            Some("Jane Doe")
        );
        assert!(updates.recent_entities.unwrap().iter().any(|e| e.text == "Jane Doe"));
    }

    #[tokio::test]
    async fn progress_overall_uses_assessment_narration() {
        let p = processor(StubBudget::ok(sample_budget()), Some(sample_progress()));

        let response = p
            .process_query("How is progress toward goals?", &ctx_with_client(1))
            .await
            .unwrap();

        assert!(response.content.contains("72.0"));
        assert_eq!(
            response.visualization_hint,
            Some(VisualizationHint::ProgressBars)
        );
        assert!(response.suggested_follow_ups.len() <= 3);
    }

    #[tokio::test]
    async fn combined_view_degrades_per_source() {
        let p = processor(StubBudget::ok(sample_budget()), None);

        let response = p
            .process_query(
                "Give me an overview of budget and progress",
                &ctx_with_client(1),
            )
            .await
            .unwrap();

        assert!(response.content.contains("Budget:"));
        assert!(response.content.contains("unavailable"));
        assert!(response.confidence < 0.9);
    }

    #[tokio::test]
    async fn combined_view_joins_both_sections() {
        let p = processor(StubBudget::ok(sample_budget()), Some(sample_progress()));

        let response = p
            .process_query(
                "How does spending compare to goal progress?",
                &ctx_with_client(1),
            )
            .await
            .unwrap();

        assert!(response.content.contains("Budget:"));
        assert!(response.content.contains("Progress:"));
        // 40% utilization vs 72% progress: the cost-effective branch.
        assert!(response.content.contains("cost-effective"));
    }

    #[tokio::test]
    async fn general_catalog_strategy_question_needs_no_client() {
        let p = processor(StubBudget::ok(sample_budget()), Some(sample_progress()));

        let response = p
            .process_query("What strategies are available?", &QueryContext::default())
            .await
            .unwrap();

        assert!(response.content.contains("2 strategies"));
        assert!(response.content.contains("Sound practice"));
    }

    #[tokio::test]
    async fn statistics_answer_summarizes_practice() {
        let p = processor(StubBudget::ok(sample_budget()), Some(sample_progress()));

        let response = p
            .process_query("Show database statistics", &QueryContext::default())
            .await
            .unwrap();

        assert!(response.content.contains("42 clients"));
        assert_eq!(response.visualization_hint, Some(VisualizationHint::Table));
    }

    #[tokio::test]
    async fn small_talk_falls_back_to_capability_summary() {
        let p = processor(StubBudget::ok(sample_budget()), Some(sample_progress()));

        let response = p
            .process_query("Good morning!", &QueryContext::default())
            .await
            .unwrap();

        assert!(response.content.contains("I can help you analyze"));
        assert_eq!(response.confidence, 0.5);
    }
}
