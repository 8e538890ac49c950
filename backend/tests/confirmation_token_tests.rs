//! Confirmation token tests
//!
//! Tests for supplier confirmation links including:
//! - Issue/validate round trip
//! - Expiry, checked before the signature
//! - Tampering and foreign keys
//! - Binding to order id and order kind

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use pos_inventory_backend::services::ConfirmationTokenService;
use pos_inventory_backend::{AppError, FixedClock};
use shared::{OrderKind, ORDER_VERIFICATION};

const SECRET: &[u8] = b"confirmation-secret-for-tests-0123456789";

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_717_200_000, 0).unwrap()
}

fn service_at(now: DateTime<Utc>) -> (ConfirmationTokenService, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(now));
    (ConfirmationTokenService::new(SECRET, clock.clone()), clock)
}

/// Replace the payload part of a token, keeping the original signature
fn with_payload(token: &str, json: &str) -> String {
    let (_, signature) = token.split_once('.').unwrap();
    format!("{}.{}", URL_SAFE_NO_PAD.encode(json), signature)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let (svc, _) = service_at(start());
        let token = svc.issue(42, 7, OrderKind::Reorder, 3).unwrap();

        let payload = svc.validate(&token).unwrap();
        assert_eq!(payload.order_id, 42);
        assert_eq!(payload.supplier_id, 7);
        assert_eq!(payload.kind, OrderKind::Reorder);
        assert_eq!(payload.action, ORDER_VERIFICATION);
        assert_eq!(payload.expires_at, (start() + Duration::days(3)).timestamp());
    }

    #[test]
    fn test_valid_until_expiry_instant() {
        let (svc, clock) = service_at(start());
        let token = svc.issue(1, 1, OrderKind::PurchaseOrder, 3).unwrap();

        clock.advance(Duration::days(3));
        assert!(svc.validate(&token).is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(svc.validate(&token), Err(AppError::TokenExpired)));
    }

    #[test]
    fn test_expired_is_reported_even_with_bad_signature() {
        let (svc, clock) = service_at(start());
        let token = svc.issue(1, 1, OrderKind::Reorder, 1).unwrap();
        let forged = with_payload(
            &token,
            &format!(
                r#"{{"order_id":2,"supplier_id":1,"type":"reorder","expires_at":{},"action":"order_verification"}}"#,
                start().timestamp() + 10
            ),
        );

        clock.advance(Duration::days(2));
        assert!(matches!(svc.validate(&forged), Err(AppError::TokenExpired)));
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let (svc, _) = service_at(start());
        let token = svc.issue(1, 1, OrderKind::Reorder, 3).unwrap();
        let forged = with_payload(
            &token,
            &format!(
                r#"{{"order_id":1,"supplier_id":99,"type":"reorder","expires_at":{},"action":"order_verification"}}"#,
                (start() + Duration::days(3)).timestamp()
            ),
        );
        assert!(matches!(svc.validate(&forged), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_token_from_other_key_is_invalid() {
        let clock = Arc::new(FixedClock::new(start()));
        let ours = ConfirmationTokenService::new(SECRET, clock.clone());
        let theirs = ConfirmationTokenService::new(b"some-other-secret-some-other-secret", clock);

        let token = theirs.issue(1, 1, OrderKind::Reorder, 3).unwrap();
        assert!(matches!(ours.validate(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let (svc, _) = service_at(start());
        for token in ["", "no-dot", "!!!.???", "e30.e30", "a.b.c"] {
            assert!(
                matches!(svc.validate(token), Err(AppError::InvalidToken)),
                "{:?} accepted",
                token
            );
        }
    }

    #[test]
    fn test_unknown_order_type_is_invalid() {
        let (svc, _) = service_at(start());
        let token = svc.issue(1, 1, OrderKind::Reorder, 3).unwrap();
        let forged = with_payload(
            &token,
            &format!(
                r#"{{"order_id":1,"supplier_id":1,"type":"invoice","expires_at":{},"action":"order_verification"}}"#,
                (start() + Duration::days(3)).timestamp()
            ),
        );
        assert!(matches!(svc.validate(&forged), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_kind_mismatch_is_invalid_token() {
        let (svc, _) = service_at(start());
        let token = svc.issue(5, 1, OrderKind::PurchaseOrder, 3).unwrap();

        assert!(svc.validate_for(&token, OrderKind::PurchaseOrder, 5).is_ok());
        assert!(matches!(
            svc.validate_for(&token, OrderKind::Reorder, 5),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_order_mismatch_is_invalid_token() {
        let (svc, _) = service_at(start());
        let token = svc.issue(5, 1, OrderKind::Reorder, 3).unwrap();
        assert!(matches!(
            svc.validate_for(&token, OrderKind::Reorder, 6),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_ttl_bounds() {
        let (svc, _) = service_at(start());
        assert!(svc.issue(1, 1, OrderKind::Reorder, 0).is_err());
        assert!(svc.issue(1, 1, OrderKind::Reorder, 31).is_err());
        assert!(svc.issue(1, 1, OrderKind::Reorder, 30).is_ok());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn kind_strategy() -> impl Strategy<Value = OrderKind> {
        prop_oneof![Just(OrderKind::PurchaseOrder), Just(OrderKind::Reorder)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// validate(issue(o, s, k, ttl)) returns exactly (o, s, k) while unexpired
        #[test]
        fn prop_round_trip(
            order_id in 1i64..1_000_000,
            supplier_id in 1i64..1_000_000,
            kind in kind_strategy(),
            ttl in 1i64..=30,
            elapsed in 0i64..=86_400
        ) {
            let (svc, clock) = service_at(start());
            let token = svc.issue(order_id, supplier_id, kind, ttl).unwrap();

            clock.advance(Duration::seconds(elapsed));
            let payload = svc.validate(&token).unwrap();
            prop_assert!(payload.matches(order_id, supplier_id, kind));
        }

        /// Past the TTL every token is expired
        #[test]
        fn prop_expired_after_ttl(
            ttl in 1i64..=30,
            extra in 1i64..=1_000_000
        ) {
            let (svc, clock) = service_at(start());
            let token = svc.issue(1, 2, OrderKind::Reorder, ttl).unwrap();

            clock.advance(Duration::days(ttl) + Duration::seconds(extra));
            prop_assert!(matches!(svc.validate(&token), Err(AppError::TokenExpired)));
        }

        /// Flipping any character of the signature invalidates the token
        #[test]
        fn prop_signature_tamper_detected(position in 0usize..43) {
            let (svc, _) = service_at(start());
            let token = svc.issue(1, 2, OrderKind::PurchaseOrder, 3).unwrap();
            let (body, signature) = token.split_once('.').unwrap();

            let mut chars: Vec<char> = signature.chars().collect();
            let i = position % chars.len();
            chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
            let forged = format!("{}.{}", body, chars.into_iter().collect::<String>());

            prop_assert!(matches!(svc.validate(&forged), Err(AppError::InvalidToken)));
        }
    }
}
