use std::collections::BTreeMap;
use std::sync::Arc;

use super::StageMetrics;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub stage: String,
    pub items_processed: u64,
    pub errors_count: u64,
    pub dropped_count: u64,
    pub invalid_count: u64,
    pub avg_latency_us: u64,
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<String, Arc<StageMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics for `stage`, registered on first use
    pub fn stage(&mut self, stage: &str) -> Arc<StageMetrics> {
        self.metrics
            .entry(stage.to_string())
            .or_insert_with(|| Arc::new(StageMetrics::new(stage)))
            .clone()
    }

    pub fn get(&self, stage: &str) -> Option<Arc<StageMetrics>> {
        self.metrics.get(stage).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(id, metrics)| {
                (
                    id.clone(),
                    MetricsSnapshot {
                        stage: metrics.stage().to_string(),
                        items_processed: metrics.items_processed(),
                        errors_count: metrics.errors_count(),
                        dropped_count: metrics.dropped_count(),
                        invalid_count: metrics.invalid_count(),
                        avg_latency_us: metrics.avg_latency_us(),
                    },
                )
            })
            .collect()
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.snapshot();

        if snapshot.is_empty() {
            return "No stages registered".to_string();
        }

        let mut report = String::from("=== Pipeline Metrics ===\n");
        for (stage, metrics) in snapshot.iter() {
            report.push_str(&format!(
                "\n[{}]\n  Items: {} processed\n  Errors: {}\n  Avg Latency: {}μs\n",
                stage,
                metrics.items_processed,
                match metrics.errors_count {
                    1 => "1 error".to_string(),
                    n => format!("{} errors", n),
                },
                metrics.avg_latency_us
            ));
            if metrics.dropped_count > 0 {
                report.push_str(&format!("  Dropped: {}\n", metrics.dropped_count));
            }
            if metrics.invalid_count > 0 {
                report.push_str(&format!("  Invalid estimates: {}\n", metrics.invalid_count));
            }
        }
        report
    }
}
