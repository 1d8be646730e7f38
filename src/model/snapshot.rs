use crate::model::enums::SnapshotReason;
use crate::schema::snapshot;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::Serialize;

/// A point-in-time observation of an item's score/descendants, kept
/// alongside the mutable `item` row (spec.md section 4.3).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = snapshot)]
#[diesel(check_for_backend(Pg))]
pub struct Snapshot {
    pub id: i64,
    pub item_id: i64,
    pub captured_at: i64,
    pub score: Option<i32>,
    pub descendants: Option<i32>,
    pub reason: SnapshotReason,
}

#[derive(Insertable)]
#[diesel(table_name = snapshot)]
#[diesel(check_for_backend(Pg))]
pub struct NewSnapshot {
    pub item_id: i64,
    pub captured_at: i64,
    pub score: Option<i32>,
    pub descendants: Option<i32>,
    pub reason: SnapshotReason,
}
