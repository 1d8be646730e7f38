use crate::schema::state;
use diesel::pg::Pg;
use diesel::prelude::*;

/// Well-known `state.key` values (spec.md sections 4.1/4.2/4.4).
pub mod keys {
    pub const MAX_ITEM_ID_SEEN: &str = "max_item_id_seen";
    pub const LAST_DISCOVERY_RUN: &str = "last_discovery_run";
    pub const LAST_UPDATES_CHECK: &str = "last_updates_check";
    pub const LAST_BACKFILL_RUN: &str = "last_backfill_run";
    pub const ITEMS_ARCHIVED_TODAY: &str = "items_archived_today";
    pub const ERRORS_TODAY: &str = "errors_today";
}

/// A single scalar counter or watermark, keyed by name.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = state)]
#[diesel(primary_key(key))]
#[diesel(check_for_backend(Pg))]
pub struct State {
    pub key: String,
    pub value: i64,
    pub updated_at: i64,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = state)]
#[diesel(check_for_backend(Pg))]
pub struct StateRow {
    pub key: String,
    pub value: i64,
    pub updated_at: i64,
}
