//! Idempotency keys for order creation.

use common::{OrderId, UserId};
use sha2::{Digest, Sha256};
use store::IdempotencyRecord;

use crate::OrderError;

/// Status code recorded for a successfully created order.
pub const CREATED_STATUS: u16 = 201;

/// Longest key the ledger accepts, in bytes.
pub const MAX_KEY_LEN: usize = 255;

const CREATE_ORDER_TAG: &str = "create_order";

/// Fingerprint of a create-order request.
///
/// Covers only the user and the operation, not the cart contents: a retry
/// under the same key is the same request even if the cart changed since.
pub fn fingerprint(user_id: UserId) -> String {
    hex::encode(Sha256::digest(format!("{CREATE_ORDER_TAG}:{user_id}")))
}

/// Trims a client-supplied key. Blank keys mean "no key".
pub fn normalize_key(key: Option<&str>) -> Result<Option<&str>, OrderError> {
    match key.map(str::trim) {
        None | Some("") => Ok(None),
        Some(key) if key.len() > MAX_KEY_LEN => {
            Err(OrderError::InvalidIdempotencyKey { max: MAX_KEY_LEN })
        }
        Some(key) => Ok(Some(key)),
    }
}

/// Decides what an existing record means for a new attempt under its key.
///
/// A completed record from the same request replays its order id. Anything
/// else, including a record left by another user or request, is a conflict.
pub fn resolve_existing(
    record: &IdempotencyRecord,
    user_id: UserId,
    fingerprint: &str,
) -> Result<OrderId, OrderError> {
    if record.user_id != user_id || record.fingerprint != fingerprint {
        return Err(OrderError::IdempotencyConflict);
    }
    match (record.status_code, record.order_id) {
        (Some(CREATED_STATUS), Some(order_id)) if order_id.get() != 0 => Ok(order_id),
        _ => Err(OrderError::IdempotencyConflict),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status_code: Option<u16>, order_id: Option<i64>) -> IdempotencyRecord {
        IdempotencyRecord {
            key: "k1".to_string(),
            user_id: UserId::new(1),
            fingerprint: fingerprint(UserId::new(1)),
            status_code,
            order_id: order_id.map(OrderId::new),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_per_user() {
        let a = fingerprint(UserId::new(1));
        assert_eq!(a, fingerprint(UserId::new(1)));
        assert_ne!(a, fingerprint(UserId::new(2)));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_blank_key_means_no_key() {
        assert_eq!(normalize_key(None).unwrap(), None);
        assert_eq!(normalize_key(Some("")).unwrap(), None);
        assert_eq!(normalize_key(Some("   ")).unwrap(), None);
        assert_eq!(normalize_key(Some(" k1 ")).unwrap(), Some("k1"));
    }

    #[test]
    fn test_oversized_key_rejected() {
        let key = "x".repeat(MAX_KEY_LEN + 1);
        assert!(matches!(
            normalize_key(Some(&key)),
            Err(OrderError::InvalidIdempotencyKey { .. })
        ));
        assert!(normalize_key(Some(&key[..MAX_KEY_LEN])).is_ok());
    }

    #[test]
    fn test_completed_record_replays() {
        let fp = fingerprint(UserId::new(1));
        let id = resolve_existing(&record(Some(201), Some(42)), UserId::new(1), &fp).unwrap();
        assert_eq!(id, OrderId::new(42));
    }

    #[test]
    fn test_incomplete_record_conflicts() {
        let fp = fingerprint(UserId::new(1));
        for rec in [
            record(None, None),
            record(Some(201), None),
            record(Some(201), Some(0)),
            record(Some(500), Some(42)),
        ] {
            assert!(matches!(
                resolve_existing(&rec, UserId::new(1), &fp),
                Err(OrderError::IdempotencyConflict)
            ));
        }
    }

    #[test]
    fn test_foreign_record_conflicts() {
        let other = UserId::new(2);
        let result = resolve_existing(&record(Some(201), Some(42)), other, &fingerprint(other));
        assert!(matches!(result, Err(OrderError::IdempotencyConflict)));
    }
}
