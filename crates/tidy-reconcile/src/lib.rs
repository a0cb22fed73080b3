//! Reconciles free-text task descriptions from a zone analysis against the
//! zone's pending tasks: matching re-worded descriptions to tracked tasks,
//! creating the new ones, and auto-completing tasks that stopped showing up.

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod matcher;
pub mod policy;
pub mod similarity;
pub mod threshold;
pub mod zones;

pub use config::{ConfigError, ReconcileConfig};
pub use engine::{ReconcileCommand, ReconciliationEngine, ReconciliationPlan};
pub use error::{FetchError, MutationError};
pub use lifecycle::{
    cancel_task, complete_task_manually, ignore_task, purge_completed, zone_summary,
    DEFAULT_RETENTION_DAYS,
};
pub use matcher::{compare, NewDescription, TaskComparison, DEFAULT_SIMILARITY_THRESHOLD};
pub use policy::{
    default_rules, CompletionDecision, CompletionPolicy, CompletionRule, PolicyError,
    RuleCondition, STILL_PRESENT_REASON,
};
pub use similarity::{keywords, similarity};
pub use threshold::{AdaptiveThreshold, ThresholdConfig, ThresholdError};
pub use zones::ZoneTrackers;
