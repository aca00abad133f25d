pub mod config;
pub mod conversation;
pub mod entities;
pub mod error;
pub mod intent;
pub mod processor;
pub mod services;
pub mod session;
pub mod strategy;
pub mod templates;
pub mod topics;
pub mod types;
pub mod vocabulary;

// Re-export primary types for convenience
pub use config::AgentConfig;
pub use error::FailureKind;
pub use intent::{parse_intent, BudgetQuery, ProgressQuery, QueryIntent, StrategyQuery};
pub use processor::QueryProcessor;
pub use services::{
    BudgetAnalysis, BudgetDataService, ClientProfile, DatabaseStatistics, GoalSummary,
    KnowledgeService, ProgressAnalysis, ProgressDataService, ServiceError, Strategy,
    StrategyDataService,
};
pub use session::SessionStore;
pub use types::{
    AgentResponse, ConversationMemory, ExtractedEntity, MemoryUpdates, Message, QueryContext,
    VisualizationHint,
};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
