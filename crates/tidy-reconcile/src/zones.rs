use crate::config::ReconcileConfig;
use crate::engine::ReconciliationEngine;
use crate::threshold::{AdaptiveThreshold, ThresholdError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tidy_core::ReconciliationResult;
use tidy_storage::TaskStore;

/// One [`ReconciliationEngine`] per zone, created on first use from a shared
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct ZoneTrackers {
    config: ReconcileConfig,
    engines: BTreeMap<String, ReconciliationEngine>,
}

impl ZoneTrackers {
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            config,
            engines: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn engine(&mut self, zone_id: &str) -> &mut ReconciliationEngine {
        let config = &self.config;
        self.engines
            .entry(zone_id.to_string())
            .or_insert_with(|| ReconciliationEngine::new(zone_id, config))
    }

    pub fn zone_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.engines.keys().map(String::as_str)
    }

    /// Current threshold for `zone_id`, or the configured starting value for a
    /// zone that has not been seen yet.
    pub fn threshold(&self, zone_id: &str) -> f64 {
        self.engines
            .get(zone_id)
            .map(ReconciliationEngine::threshold)
            .unwrap_or_else(|| AdaptiveThreshold::new(self.config.threshold.clone()).value())
    }

    pub fn adjust_threshold(
        &mut self,
        zone_id: &str,
        accuracy_feedback: f64,
    ) -> Result<f64, ThresholdError> {
        self.engine(zone_id).adjust_threshold(accuracy_feedback)
    }

    pub fn reconcile<T, S>(
        &mut self,
        store: &T,
        zone_id: &str,
        current: &[S],
        confidence_scores: &[f64],
    ) -> ReconciliationResult
    where
        T: TaskStore + ?Sized,
        S: AsRef<str>,
    {
        self.reconcile_at(store, zone_id, current, confidence_scores, Utc::now())
    }

    pub fn reconcile_at<T, S>(
        &mut self,
        store: &T,
        zone_id: &str,
        current: &[S],
        confidence_scores: &[f64],
        now: DateTime<Utc>,
    ) -> ReconciliationResult
    where
        T: TaskStore + ?Sized,
        S: AsRef<str>,
    {
        self.engine(zone_id)
            .reconcile_at(store, current, confidence_scores, now)
    }
}
