//! Authentication middleware
//!
//! JWT authentication and permission checks for staff routes. Supplier routes
//! do not pass through here; they carry a confirmation token instead.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::AppState;

pub const INVENTORY_READ: &str = "inventory:read";
pub const INVENTORY_ADJUST: &str = "inventory:adjust";
pub const INVENTORY_AUDIT: &str = "inventory:audit";
pub const ORDERS_MANAGE: &str = "orders:manage";
pub const ORDERS_RECEIVE: &str = "orders:receive";
pub const SALES_CHECKOUT: &str = "sales:checkout";
pub const SALES_REFUND: &str = "sales:refund";

/// Authenticated staff member extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i64,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Check if user has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub permissions: Vec<String>,
    pub exp: i64,
}

/// Validates the bearer token and stores the `AuthUser` in request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return AppError::Unauthorized("Missing or invalid Authorization header".to_string())
                .into_response();
        }
    };

    let claims = match decode_jwt(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    let user_id = match claims.sub.parse::<i64>() {
        Ok(id) => id,
        Err(_) => {
            return AppError::Unauthorized("Invalid user ID in token".to_string()).into_response()
        }
    };

    request.extensions_mut().insert(AuthUser {
        user_id,
        permissions: claims.permissions,
    });

    next.run(request).await
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// Permission guard for use in handlers
pub fn check_permission(user: &AuthUser, permission: &str) -> Result<(), AppError> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        tracing::debug!(user_id = user.user_id, permission, "Permission denied");
        Err(AppError::InsufficientPermissions)
    }
}
