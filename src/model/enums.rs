use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unrecognized item kind {0:?}")]
pub struct UnknownItemKind(String);

/// The variant kind of an archived item (spec.md section 3).
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsExpression, FromSqlRow, Display, EnumString, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Story,
    Comment,
    Job,
    Poll,
    Pollopt,
}

impl<DB: Backend> ToSql<Text, DB> for ItemKind
where
    str: ToSql<Text, DB>,
{
    fn to_sql<'a>(&'a self, out: &mut Output<'a, '_, DB>) -> serialize::Result {
        self.to_string().as_str().to_sql(out)
    }
}

impl FromSql<Text, diesel::pg::Pg> for ItemKind {
    fn from_sql(bytes: <diesel::pg::Pg as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, diesel::pg::Pg>>::from_sql(bytes)?;
        text.parse().map_err(|_| Box::new(UnknownItemKind(text)) as Box<dyn std::error::Error + Send + Sync>)
    }
}

#[derive(Debug, Error)]
#[error("unrecognized snapshot reason {0:?}")]
pub struct UnknownSnapshotReason(String);

/// Why a snapshot was emitted (spec.md section 4.3). Kept as a closed,
/// tagged variant per spec.md section 9's "snapshot reason enum" note, even
/// though the column itself is a checked string.
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsExpression, FromSqlRow, Display, EnumString, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    ScoreSpike,
    FrontPage,
    Sample,
    NewItem,
}

impl<DB: Backend> ToSql<Text, DB> for SnapshotReason
where
    str: ToSql<Text, DB>,
{
    fn to_sql<'a>(&'a self, out: &mut Output<'a, '_, DB>) -> serialize::Result {
        self.to_string().as_str().to_sql(out)
    }
}

impl FromSql<Text, diesel::pg::Pg> for SnapshotReason {
    fn from_sql(bytes: <diesel::pg::Pg as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, diesel::pg::Pg>>::from_sql(bytes)?;
        text.parse()
            .map_err(|_| Box::new(UnknownSnapshotReason(text)) as Box<dyn std::error::Error + Send + Sync>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn item_kind_round_trips_through_its_string_form() {
        for kind in [ItemKind::Story, ItemKind::Comment, ItemKind::Job, ItemKind::Poll, ItemKind::Pollopt] {
            assert_eq!(ItemKind::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn snapshot_reason_round_trips_through_its_string_form() {
        for reason in [
            SnapshotReason::ScoreSpike,
            SnapshotReason::FrontPage,
            SnapshotReason::Sample,
            SnapshotReason::NewItem,
        ] {
            assert_eq!(SnapshotReason::from_str(&reason.to_string()).unwrap(), reason);
        }
    }

    #[test]
    fn snapshot_reason_uses_snake_case() {
        assert_eq!(SnapshotReason::ScoreSpike.to_string(), "score_spike");
        assert_eq!(SnapshotReason::NewItem.to_string(), "new_item");
    }
}
