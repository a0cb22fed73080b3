use crate::engine::ReconcileCommand;
use thiserror::Error;
use tidy_storage::StoreError;

/// The pending tasks for a zone could not be read; the cycle stops.
#[derive(Debug, Error)]
#[error("failed to fetch pending tasks for zone {zone_id}: {source}")]
pub struct FetchError {
    pub zone_id: String,
    #[source]
    pub source: StoreError,
}

/// A single create / increment / complete did not take effect. The cycle goes
/// on with the remaining commands.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("{command} failed: {source}")]
    Store {
        command: String,
        #[source]
        source: StoreError,
    },
    #[error("{command} had no effect: task is missing or no longer pending")]
    NotApplied { command: String },
}

impl MutationError {
    pub(crate) fn store(command: &ReconcileCommand, source: StoreError) -> Self {
        Self::Store {
            command: command.to_string(),
            source,
        }
    }

    pub(crate) fn not_applied(command: &ReconcileCommand) -> Self {
        Self::NotApplied {
            command: command.to_string(),
        }
    }
}
