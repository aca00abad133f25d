//! External data-service boundary.
//!
//! The engine consumes these as abstract async collaborators — HTTP, RPC, or
//! in-process implementations all satisfy the contracts. Implementations may
//! return [`ServiceError`] for precise failure text, but the engine classifies
//! failures by message content, so any `anyhow`-compatible error works.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Analysis shapes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingPatterns {
    pub trend: String,
    #[serde(default)]
    pub high_usage_categories: Vec<String>,
    #[serde(default)]
    pub projected_overages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAnalysis {
    pub total_budget: f64,
    pub total_allocated: f64,
    pub total_spent: f64,
    pub remaining: f64,
    /// Percentage, 0..100.
    pub utilization_rate: f64,
    pub forecasted_depletion: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending_by_category: Option<HashMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending_patterns: Option<SpendingPatterns>,
    /// Dollars per week at the current pace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending_velocity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub milestone_id: i64,
    pub title: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub goal_id: i64,
    pub goal_title: String,
    /// Percentage, 0..100.
    pub progress: f64,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressAnalysis {
    /// Percentage, 0..100.
    pub overall_progress: f64,
    /// Percentage, 0..100.
    pub attendance_rate: f64,
    pub sessions_completed: u32,
    pub sessions_cancelled: u32,
    #[serde(default)]
    pub goal_progress: Vec<GoalProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Goal text fed to key-term extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalSummary {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Demographics used by the personalization layer of the strategy scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub client_id: i64,
    pub date_of_birth: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatistics {
    pub total_clients: u64,
    pub active_clients: u64,
    pub total_budget_plans: u64,
    /// Percentage, 0..100.
    pub average_utilization: f64,
    #[serde(default)]
    pub category_averages: HashMap<String, f64>,
    #[serde(default)]
    pub age_distribution: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicInfo {
    pub topic: String,
    pub summary: String,
}

// ============================================================================
// Service traits
// ============================================================================

#[async_trait]
pub trait BudgetDataService: Send + Sync {
    async fn get_budget_analysis(&self, client_id: i64) -> Result<BudgetAnalysis>;
}

#[async_trait]
pub trait ProgressDataService: Send + Sync {
    async fn get_progress_analysis(&self, client_id: i64) -> Result<ProgressAnalysis>;
}

#[async_trait]
pub trait StrategyDataService: Send + Sync {
    async fn get_all_strategies(&self) -> Result<Vec<Strategy>>;

    async fn get_recommended_strategies_for_goal(&self, goal_id: i64) -> Result<Vec<Strategy>>;

    /// Recommendations per goal title for every goal of the client.
    async fn get_recommended_strategies_for_client(
        &self,
        client_id: i64,
    ) -> Result<HashMap<String, Vec<Strategy>>>;
}

/// Non-client-specific knowledge: practice-wide statistics and background
/// topic info for general questions.
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn get_database_statistics(&self) -> Result<DatabaseStatistics>;

    async fn get_topic_info(&self, topic: &str) -> Result<Option<TopicInfo>>;
}

/// Typed error offered to service implementors. The engine's failure
/// classification inspects message text, so these display strings carry the
/// classifying words.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timeout: {0}")]
    Timeout(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    Other(String),
}
