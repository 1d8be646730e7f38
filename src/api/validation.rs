//! Path/query validation (spec.md section 4.7 step 4), applied inside each
//! handler after the admission middleware stack has already run.

use crate::api::error::ApiError;

pub const MIN_ITEM_ID: i64 = 1;
pub const MAX_ITEM_ID: i64 = 100_000_000;

pub fn validate_item_id(id: i64) -> Result<i64, ApiError> {
    if (MIN_ITEM_ID..=MAX_ITEM_ID).contains(&id) { Ok(id) } else { Err(ApiError::InvalidItemId) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_boundaries() {
        assert!(validate_item_id(0).is_err());
        assert!(validate_item_id(MIN_ITEM_ID).is_ok());
        assert!(validate_item_id(MAX_ITEM_ID).is_ok());
        assert!(validate_item_id(MAX_ITEM_ID + 1).is_err());
    }

    #[test]
    fn negative_ids_are_rejected() {
        assert!(validate_item_id(-1).is_err());
    }
}
