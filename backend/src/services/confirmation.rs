//! Signed, expiring confirmation tokens for supplier-facing order actions
//!
//! A token is `base64url(payload_json) "." base64url(hmac_sha256(key, encoded_payload))`.
//! Nothing is stored server-side: validity depends only on the token bytes,
//! the signing key and the clock.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine as _};
use chrono::Duration;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use shared::{ConfirmationPayload, DomainError, OrderKind, ORDER_VERIFICATION};

type HmacSha256 = Hmac<Sha256>;

/// Issues and validates supplier confirmation tokens
#[derive(Clone)]
pub struct ConfirmationTokenService {
    key: Arc<[u8]>,
    clock: Arc<dyn Clock>,
}

/// Token body as it arrives, before required fields are checked
#[derive(Debug, Deserialize)]
struct RawPayload {
    order_id: Option<i64>,
    supplier_id: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    expires_at: Option<i64>,
    action: Option<String>,
}

/// A freshly issued token and the claims signed into it
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub payload: ConfirmationPayload,
}

impl ConfirmationTokenService {
    pub fn new(secret: impl AsRef<[u8]>, clock: Arc<dyn Clock>) -> Self {
        Self {
            key: Arc::from(secret.as_ref()),
            clock,
        }
    }

    /// Issue a token binding `order_id`, `supplier_id` and `kind` for `ttl_days`
    pub fn issue(
        &self,
        order_id: i64,
        supplier_id: i64,
        kind: OrderKind,
        ttl_days: i64,
    ) -> AppResult<String> {
        Ok(self.issue_token(order_id, supplier_id, kind, ttl_days)?.token)
    }

    /// Issue a token together with the payload it carries
    pub fn issue_token(
        &self,
        order_id: i64,
        supplier_id: i64,
        kind: OrderKind,
        ttl_days: i64,
    ) -> AppResult<IssuedToken> {
        shared::validate_ttl_days(ttl_days)?;

        let payload = ConfirmationPayload {
            order_id,
            supplier_id,
            kind,
            expires_at: (self.clock.now() + Duration::days(ttl_days)).timestamp(),
            action: ORDER_VERIFICATION.to_string(),
        };

        let json = serde_json::to_vec(&payload)
            .map_err(|e| AppError::Internal(format!("Token serialization failed: {}", e)))?;
        let body = B64.encode(json);
        let signature = B64.encode(self.sign(body.as_bytes())?);

        Ok(IssuedToken {
            token: format!("{}.{}", body, signature),
            payload,
        })
    }

    /// Decode and verify a token. Expiry is reported as `TokenExpired` even
    /// when the signature would not verify.
    pub fn validate(&self, token: &str) -> AppResult<ConfirmationPayload> {
        let (body, signature) = token
            .split_once('.')
            .ok_or_else(|| DomainError::invalid_token("malformed token"))?;

        let json = B64
            .decode(body)
            .map_err(|_| DomainError::invalid_token("payload is not base64"))?;
        let signature = B64
            .decode(signature)
            .map_err(|_| DomainError::invalid_token("signature is not base64"))?;

        let raw: RawPayload = serde_json::from_slice(&json)
            .map_err(|_| DomainError::invalid_token("payload is not JSON"))?;

        let payload = Self::require_fields(raw)?;

        if self.clock.now().timestamp() > payload.expires_at {
            return Err(DomainError::TokenExpired.into());
        }

        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| DomainError::invalid_token("signature mismatch"))?;

        Ok(payload)
    }

    /// Validate a token presented on the `kind` endpoint for `order_id`.
    /// The supplier binding is checked by the caller once the order is loaded.
    pub fn validate_for(
        &self,
        token: &str,
        kind: OrderKind,
        order_id: i64,
    ) -> AppResult<ConfirmationPayload> {
        let payload = self.validate(token)?;

        if payload.kind != kind {
            return Err(DomainError::OrderTypeMismatch.into());
        }
        if payload.order_id != order_id {
            return Err(DomainError::invalid_token("token was issued for another order").into());
        }

        Ok(payload)
    }

    fn require_fields(raw: RawPayload) -> Result<ConfirmationPayload, DomainError> {
        fn missing(field: &str) -> DomainError {
            DomainError::invalid_token(format!("missing {}", field))
        }

        let order_id = raw.order_id.ok_or_else(|| missing("order_id"))?;
        let supplier_id = raw.supplier_id.ok_or_else(|| missing("supplier_id"))?;
        let kind = raw.kind.ok_or_else(|| missing("type"))?;
        let expires_at = raw.expires_at.ok_or_else(|| missing("expires_at"))?;
        let action = raw.action.ok_or_else(|| missing("action"))?;

        let kind = kind
            .parse::<OrderKind>()
            .map_err(|_| DomainError::invalid_token(format!("unknown order type {}", kind)))?;

        if action != ORDER_VERIFICATION {
            return Err(DomainError::invalid_token(format!("unsupported action {}", action)));
        }

        Ok(ConfirmationPayload {
            order_id,
            supplier_id,
            kind,
            expires_at,
            action,
        })
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|_| AppError::Internal("Failed to create HMAC".to_string()))
    }

    fn sign(&self, data: &[u8]) -> AppResult<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Supplier-facing link for an order, e.g.
/// `https://shop.example/supplier/reorders/12?token=...&type=reorder`
pub fn confirmation_url(base_url: &str, kind: OrderKind, order_id: i64, token: &str) -> String {
    format!(
        "{}/supplier/{}/{}?token={}&type={}",
        base_url.trim_end_matches('/'),
        kind.path_segment(),
        order_id,
        token,
        kind.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::DateTime;

    fn service() -> (ConfirmationTokenService, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        (
            ConfirmationTokenService::new(b"test-secret-key-test-secret-key!", clock.clone()),
            clock,
        )
    }

    #[test]
    fn token_is_url_safe() {
        let (svc, _) = service();
        let token = svc.issue(1, 2, OrderKind::Reorder, 3).unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
    }

    #[test]
    fn issued_payload_matches_token() {
        let (svc, clock) = service();
        let issued = svc.issue_token(4, 9, OrderKind::PurchaseOrder, 3).unwrap();

        clock.advance(Duration::hours(5));
        let decoded = svc.validate(&issued.token).unwrap();
        assert_eq!(decoded, issued.payload);
        assert_eq!(issued.payload.expires_at, 1_700_000_000 + 3 * 86_400);
    }

    #[test]
    fn missing_field_is_invalid() {
        let (svc, _) = service();
        let body = B64.encode(br#"{"order_id":1,"type":"reorder","expires_at":9999999999,"action":"order_verification"}"#);
        let sig = B64.encode(svc.sign(body.as_bytes()).unwrap());
        let err = svc.validate(&format!("{}.{}", body, sig)).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[test]
    fn wrong_action_is_invalid() {
        let (svc, _) = service();
        let body = B64.encode(br#"{"order_id":1,"supplier_id":2,"type":"reorder","expires_at":9999999999,"action":"delete"}"#);
        let sig = B64.encode(svc.sign(body.as_bytes()).unwrap());
        assert!(matches!(
            svc.validate(&format!("{}.{}", body, sig)),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn url_uses_type_path() {
        let url = confirmation_url("https://shop.example/", OrderKind::PurchaseOrder, 12, "abc.def");
        assert_eq!(
            url,
            "https://shop.example/supplier/purchase-orders/12?token=abc.def&type=purchase-order"
        );
    }
}
