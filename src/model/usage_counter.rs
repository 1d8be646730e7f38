use crate::schema::usage_counter;
use diesel::pg::Pg;
use diesel::prelude::*;

/// Budget counter key prefixes (spec.md section 4.5); callers append the
/// calendar-day or -month suffix via [`crate::clock::date_suffix`] /
/// [`crate::clock::month_suffix`].
pub mod keys {
    pub const VECTORIZE_QUERIES_PREFIX: &str = "vectorize_queries";
    pub const EMBEDDINGS_STORED: &str = "embeddings_stored";
}

/// A named counter, reset implicitly by callers switching to a new
/// date-suffixed key rather than by any row deletion (spec.md section 4.5's
/// open question: stale counters are left in place, not reaped).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = usage_counter)]
#[diesel(primary_key(key))]
#[diesel(check_for_backend(Pg))]
pub struct UsageCounter {
    pub key: String,
    pub value: i64,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = usage_counter)]
#[diesel(check_for_backend(Pg))]
pub struct UsageCounterRow {
    pub key: String,
    pub value: i64,
}
