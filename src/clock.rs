//! Millisecond-resolution timestamp helpers.
//!
//! Every persisted timestamp in this service (`Item.first_seen_at`,
//! `Snapshot.captured_at`, ...) is a plain `i64` of milliseconds since the
//! Unix epoch, not a database-native timestamp type — this keeps the store
//! layer free of timezone-conversion concerns and matches the upstream API's
//! own unix-seconds convention (scaled up by 1000).

use time::OffsetDateTime;

/// Returns the current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    let now = OffsetDateTime::now_utc();
    now.unix_timestamp() * 1000 + i64::from(now.millisecond())
}

/// Converts the upstream API's unix-seconds timestamp to local milliseconds.
pub fn seconds_to_ms(seconds: i64) -> i64 {
    seconds.saturating_mul(1000)
}

/// Start of the current UTC calendar day, in milliseconds since the epoch.
pub fn today_start_ms() -> i64 {
    day_start_ms(now_ms())
}

/// Start of the UTC calendar day containing `ms`, in milliseconds since the epoch.
pub fn day_start_ms(ms: i64) -> i64 {
    const MS_PER_DAY: i64 = 86_400_000;
    ms.div_euclid(MS_PER_DAY) * MS_PER_DAY
}

/// Renders `ms` as a `YYYY-MM-DD` date suffix, used for usage-counter keys
/// like `vectorize_queries_2026-07-26`.
pub fn date_suffix(ms: i64) -> String {
    let date = OffsetDateTime::from_unix_timestamp(ms / 1000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .date();
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

/// Renders `ms` as a `YYYY-MM` month suffix, used for usage-counter keys
/// like `vectorize_queries_2026-07`.
pub fn month_suffix(ms: i64) -> String {
    let date = OffsetDateTime::from_unix_timestamp(ms / 1000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .date();
    format!("{:04}-{:02}", date.year(), u8::from(date.month()))
}

/// Logs how long the enclosing scope took to run when dropped.
pub struct Timer<'a> {
    name: &'a str,
    start: std::time::Instant,
}

impl<'a> Timer<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        tracing::debug!("{} took {:?}", self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_start_truncates_to_midnight() {
        let noon = 1_753_531_200_000 + 43_200_000; // 2025-07-26 12:00:00 UTC
        assert_eq!(day_start_ms(noon), 1_753_531_200_000);
    }

    #[test]
    fn date_suffix_formats_zero_padded() {
        assert_eq!(date_suffix(1_704_067_200_000), "2024-01-01");
    }

    #[test]
    fn month_suffix_drops_day() {
        assert_eq!(month_suffix(1_704_067_200_000), "2024-01");
    }

    #[test]
    fn seconds_to_ms_scales() {
        assert_eq!(seconds_to_ms(1), 1000);
    }
}
