use crate::model::enums::ItemKind;
use crate::schema::item;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// The full persisted row for one archived item (spec.md section 3).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = item)]
#[diesel(check_for_backend(Pg))]
pub struct Item {
    pub id: i64,
    pub kind: ItemKind,
    pub deleted: bool,
    pub dead: bool,
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    pub author: Option<String>,
    pub external_time: i64,
    pub score: Option<i32>,
    pub descendants: Option<i32>,
    pub parent: Option<i64>,
    pub kids: Option<String>,
    pub first_seen_at: i64,
    pub last_updated_at: i64,
    pub last_changed_at: i64,
    pub update_count: i32,
    pub ai_topic: Option<String>,
    pub ai_content_type: Option<String>,
    pub ai_sentiment: Option<f64>,
    pub ai_analyzed_at: Option<i64>,
    pub embedding_generated_at: Option<i64>,
}

impl Item {
    /// Deserializes the JSON-encoded child-id list, preserving order.
    pub fn kid_ids(&self) -> Vec<i64> {
        self.kids
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = item)]
#[diesel(check_for_backend(Pg))]
pub struct ItemRow {
    pub id: i64,
    pub kind: ItemKind,
    pub deleted: bool,
    pub dead: bool,
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    pub author: Option<String>,
    pub external_time: i64,
    pub score: Option<i32>,
    pub descendants: Option<i32>,
    pub parent: Option<i64>,
    pub kids: Option<String>,
    pub first_seen_at: i64,
    pub last_updated_at: i64,
    pub last_changed_at: i64,
    pub update_count: i32,
}

/// One item as returned by the upstream client, with the discovery/update
/// pipelines' front-page observation attached (spec.md section 4.2's
/// "enriched item": external fields plus `is_front_page`).
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedItem {
    pub id: i64,
    pub kind: ItemKind,
    pub deleted: bool,
    pub dead: bool,
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    pub author: Option<String>,
    /// Unix seconds as reported by the upstream API; may be missing/non-positive.
    pub external_time: Option<i64>,
    pub score: Option<i32>,
    pub descendants: Option<i32>,
    pub parent: Option<i64>,
    pub kids: Option<Vec<i64>>,
    pub is_front_page: bool,
}

impl EnrichedItem {
    pub(crate) fn serialized_kids(&self) -> Option<String> {
        self.kids.as_ref().map(|kids| serde_json::to_string(kids).unwrap_or_default())
    }

    /// True if any content field that `last_changed_at` tracks differs from
    /// `existing` (spec.md section 4.2's `content_changed` disjunction).
    pub(crate) fn content_changed_from(&self, existing: &Item) -> bool {
        self.deleted != existing.deleted
            || self.dead != existing.dead
            || self.title != existing.title
            || self.url != existing.url
            || self.text != existing.text
            || self.score != existing.score
            || self.descendants != existing.descendants
            || self.serialized_kids() != existing.kids
            || self.author.as_deref() != existing.author.as_deref()
            || self.kind != existing.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(overrides: impl FnOnce(&mut Item)) -> Item {
        let mut item = Item {
            id: 1,
            kind: ItemKind::Story,
            deleted: false,
            dead: false,
            title: Some("Title".to_owned()),
            url: Some("https://example.com".to_owned()),
            text: None,
            author: Some("alice".to_owned()),
            external_time: 1000,
            score: Some(10),
            descendants: Some(2),
            parent: None,
            kids: Some("[1,2]".to_owned()),
            first_seen_at: 1,
            last_updated_at: 1,
            last_changed_at: 1,
            update_count: 0,
            ai_topic: None,
            ai_content_type: None,
            ai_sentiment: None,
            ai_analyzed_at: None,
            embedding_generated_at: None,
        };
        overrides(&mut item);
        item
    }

    fn sample_enriched(overrides: impl FnOnce(&mut EnrichedItem)) -> EnrichedItem {
        let mut enriched = EnrichedItem {
            id: 1,
            kind: ItemKind::Story,
            deleted: false,
            dead: false,
            title: Some("Title".to_owned()),
            url: Some("https://example.com".to_owned()),
            text: None,
            author: Some("alice".to_owned()),
            external_time: Some(1),
            score: Some(10),
            descendants: Some(2),
            parent: None,
            kids: Some(vec![1, 2]),
            is_front_page: false,
        };
        overrides(&mut enriched);
        enriched
    }

    #[test]
    fn identical_fields_mean_no_change() {
        let existing = sample_item(|_| {});
        let incoming = sample_enriched(|_| {});
        assert!(!incoming.content_changed_from(&existing));
    }

    #[test]
    fn score_change_is_detected() {
        let existing = sample_item(|_| {});
        let incoming = sample_enriched(|item| item.score = Some(11));
        assert!(incoming.content_changed_from(&existing));
    }

    #[test]
    fn kid_list_order_change_is_detected() {
        let existing = sample_item(|_| {});
        let incoming = sample_enriched(|item| item.kids = Some(vec![2, 1]));
        assert!(incoming.content_changed_from(&existing));
    }

    #[test]
    fn deleted_flag_change_is_detected() {
        let existing = sample_item(|_| {});
        let incoming = sample_enriched(|item| item.deleted = true);
        assert!(incoming.content_changed_from(&existing));
    }

    #[test]
    fn kid_ids_parses_json_array() {
        let item = sample_item(|item| item.kids = Some("[3,1,2]".to_owned()));
        assert_eq!(item.kid_ids(), vec![3, 1, 2]);
    }

    #[test]
    fn kid_ids_defaults_to_empty_when_absent() {
        let item = sample_item(|item| item.kids = None);
        assert_eq!(item.kid_ids(), Vec::<i64>::new());
    }
}
