//! The three scheduled pipelines (spec.md sections 4.4-4.6), each returning a
//! uniform [`PipelineSummary`] so the scheduler can log and record metrics
//! the same way regardless of which pipeline ran.

pub mod backfill;
pub mod discovery;
pub mod update;

use crate::model::worker_metrics::NewWorkerMetrics;
use serde::Serialize;

/// Uniform pipeline result (spec.md section 7): `success` is true iff
/// `errors == 0` and no top-level error occurred.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    pub success: bool,
    pub items_processed: i64,
    pub items_changed: i64,
    pub snapshots_created: i64,
    pub duration_ms: i64,
    pub errors: i64,
    pub error_messages: Vec<String>,
}

impl PipelineSummary {
    pub fn to_metrics_row(&self, pipeline: &str, occurred_at: i64) -> NewWorkerMetrics {
        NewWorkerMetrics {
            occurred_at,
            pipeline: pipeline.to_owned(),
            items_processed: clamp_to_i32(self.items_processed),
            items_changed: clamp_to_i32(self.items_changed),
            snapshots_created: clamp_to_i32(self.snapshots_created),
            duration_ms: self.duration_ms,
            error_count: clamp_to_i32(self.errors),
        }
    }
}

fn clamp_to_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
