use crate::result::{ResultStatus, UnitResult};
use cadre_core::FailureKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Counters for one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitStats {
    /// Unit name.
    pub unit: String,
    /// Invocations started.
    pub invocations: u64,
    /// Invocations currently running.
    pub in_flight: u64,
    /// Finished with `Succeeded`.
    pub succeeded: u64,
    /// Finished with `PartiallyFailed`.
    pub partially_failed: u64,
    /// Finished with `Failed`.
    pub failed: u64,
    /// Summed wall-clock time of finished invocations.
    pub total_duration_ms: u64,
    /// Kind of the most recent failure.
    pub last_failure: Option<FailureKind>,
    /// When the most recent invocation finished.
    pub last_finished_at: Option<DateTime<Utc>>,
}

/// Tracks invocation counters for every unit in an organization.
pub struct UnitMonitor {
    stats: Arc<RwLock<HashMap<String, UnitStats>>>,
}

impl UnitMonitor {
    /// An empty monitor.
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mark an invocation of `unit` as started.
    pub async fn start(&self, unit: &str) {
        let mut stats = self.stats.write().await;
        let entry = stats.entry(unit.to_string()).or_insert_with(|| UnitStats {
            unit: unit.to_string(),
            ..UnitStats::default()
        });
        entry.invocations += 1;
        entry.in_flight += 1;
    }

    /// Mark an invocation as finished with `result`.
    pub async fn finish(&self, result: &UnitResult) {
        let mut stats = self.stats.write().await;
        let entry = stats
            .entry(result.unit().to_string())
            .or_insert_with(|| UnitStats {
                unit: result.unit().to_string(),
                ..UnitStats::default()
            });
        entry.in_flight = entry.in_flight.saturating_sub(1);
        entry.total_duration_ms += result.duration_ms();
        entry.last_finished_at = Some(result.finished_at());
        match result.status() {
            ResultStatus::Succeeded => entry.succeeded += 1,
            ResultStatus::PartiallyFailed => entry.partially_failed += 1,
            ResultStatus::Failed => {
                entry.failed += 1;
                entry.last_failure = result.failure().map(|f| f.kind);
            }
        }
    }

    /// All units seen so far, sorted by name.
    pub async fn snapshot(&self) -> Vec<UnitStats> {
        let stats = self.stats.read().await;
        let mut all: Vec<UnitStats> = stats.values().cloned().collect();
        all.sort_by(|a, b| a.unit.cmp(&b.unit));
        all
    }

    /// Counters for one unit.
    pub async fn get(&self, unit: &str) -> Option<UnitStats> {
        let stats = self.stats.read().await;
        stats.get(unit).cloned()
    }

    /// Serialize the current counters with totals across units.
    pub async fn to_json(&self) -> serde_json::Value {
        let units = self.snapshot().await;
        let invocations: u64 = units.iter().map(|s| s.invocations).sum();
        let failed: u64 = units.iter().map(|s| s.failed).sum();
        let in_flight: u64 = units.iter().map(|s| s.in_flight).sum();
        serde_json::json!({
            "units": units,
            "aggregate": {
                "invocations": invocations,
                "failed": failed,
                "in_flight": in_flight,
            },
        })
    }
}

impl Default for UnitMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::result::UnitKind;
    use crate::task::Task;
    use uuid::Uuid;

    #[tokio::test]
    async fn start_and_finish_update_counters() {
        let monitor = UnitMonitor::new();
        let task = Task::new("t", Uuid::new_v4());

        monitor.start("Writer").await;
        assert_eq!(monitor.get("Writer").await.unwrap().in_flight, 1);

        let ok = UnitResult::succeeded("Writer", UnitKind::Worker, &task, Utc::now(), "ok");
        monitor.finish(&ok).await;

        let stats = monitor.get("Writer").await.unwrap();
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.succeeded, 1);
        assert!(stats.last_finished_at.is_some());
    }

    #[tokio::test]
    async fn failures_record_last_kind() {
        let monitor = UnitMonitor::new();
        let task = Task::new("t", Uuid::new_v4());
        monitor.start("Router").await;
        let failed = UnitResult::failed(
            "Router",
            UnitKind::Router,
            &task,
            Utc::now(),
            FailureKind::Selection,
            "no member named",
        );
        monitor.finish(&failed).await;

        let stats = monitor.get("Router").await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.last_failure, Some(FailureKind::Selection));
    }

    #[tokio::test]
    async fn json_has_units_and_aggregate() {
        let monitor = UnitMonitor::new();
        monitor.start("B").await;
        monitor.start("A").await;
        let json = monitor.to_json().await;
        assert_eq!(json["units"][0]["unit"], "A");
        assert_eq!(json["aggregate"]["invocations"], 2);
        assert_eq!(json["aggregate"]["in_flight"], 2);
    }
}
