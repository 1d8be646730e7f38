use crate::schema::error_log;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::Serialize;

/// Messages longer than this are truncated before insertion (spec.md section
/// 4.6), so one oversized payload can't blow up the error log's row size.
pub const MESSAGE_MAX_LEN: usize = 500;
pub const CONTEXT_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = error_log)]
#[diesel(check_for_backend(Pg))]
pub struct ErrorLog {
    pub id: i64,
    pub occurred_at: i64,
    pub pipeline: String,
    pub message: String,
    pub context: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = error_log)]
#[diesel(check_for_backend(Pg))]
pub struct NewErrorLog {
    pub occurred_at: i64,
    pub pipeline: String,
    pub message: String,
    pub context: Option<String>,
}

impl NewErrorLog {
    pub fn new(occurred_at: i64, pipeline: impl Into<String>, message: impl AsRef<str>, context: Option<String>) -> Self {
        Self {
            occurred_at,
            pipeline: pipeline.into(),
            message: truncate(message.as_ref(), MESSAGE_MAX_LEN),
            context: context.map(|c| truncate(&c, CONTEXT_MAX_LEN)),
        }
    }
}

fn truncate(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        value.to_owned()
    } else {
        value.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_untouched() {
        let entry = NewErrorLog::new(1, "discovery", "boom", None);
        assert_eq!(entry.message, "boom");
    }

    #[test]
    fn long_message_is_truncated() {
        let long = "x".repeat(MESSAGE_MAX_LEN + 50);
        let entry = NewErrorLog::new(1, "discovery", &long, None);
        assert_eq!(entry.message.chars().count(), MESSAGE_MAX_LEN);
    }

    #[test]
    fn long_context_is_truncated_independently() {
        let long_context = "y".repeat(CONTEXT_MAX_LEN + 10);
        let entry = NewErrorLog::new(1, "discovery", "boom", Some(long_context));
        assert_eq!(entry.context.unwrap().chars().count(), CONTEXT_MAX_LEN);
    }
}
