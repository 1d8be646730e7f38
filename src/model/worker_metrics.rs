use crate::schema::worker_metrics;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::Serialize;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = worker_metrics)]
#[diesel(check_for_backend(Pg))]
pub struct WorkerMetrics {
    pub id: i64,
    pub occurred_at: i64,
    pub pipeline: String,
    pub items_processed: i32,
    pub items_changed: i32,
    pub snapshots_created: i32,
    pub duration_ms: i64,
    pub error_count: i32,
}

#[derive(Insertable)]
#[diesel(table_name = worker_metrics)]
#[diesel(check_for_backend(Pg))]
pub struct NewWorkerMetrics {
    pub occurred_at: i64,
    pub pipeline: String,
    pub items_processed: i32,
    pub items_changed: i32,
    pub snapshots_created: i32,
    pub duration_ms: i64,
    pub error_count: i32,
}
