use crate::schema::analytics_cache;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde_json::Value;

/// A cached, precomputed analytics payload keyed by name (spec.md section
/// 4.8), e.g. topic-similarity matrices that are expensive to recompute per
/// request.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = analytics_cache)]
#[diesel(primary_key(key))]
#[diesel(check_for_backend(Pg))]
pub struct AnalyticsCacheEntry {
    pub key: String,
    pub data: Value,
    pub computed_at: i64,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = analytics_cache)]
#[diesel(check_for_backend(Pg))]
pub struct AnalyticsCacheRow {
    pub key: String,
    pub data: Value,
    pub computed_at: i64,
}
