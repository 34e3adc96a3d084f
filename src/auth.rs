//! Bearer-token authentication and the ownership permission check.
//!
//! Token issuance lives in the identity service; this API only verifies the
//! signed claims it is handed and enforces "owner or elevated role" on order
//! resources.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::UserRole;
use crate::errors::ServiceError;
use crate::AppState;

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated principal extracted from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_elevated()
    }

    /// Verify and decode a bearer token into an authenticated principal.
    pub fn from_token(token: &str, secret: &str) -> Result<Self, ServiceError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ServiceError::Unauthorized("invalid token subject".to_string()))?;

        Ok(Self {
            user_id,
            role: data.claims.role,
            company_id: data.claims.company_id,
        })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("missing authorization header".to_string())
            })?;

        let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
            ServiceError::Unauthorized("authorization header must use the Bearer scheme".to_string())
        })?;

        AuthUser::from_token(token, &state.config.jwt_secret)
    }
}

/// Assert that `actor` owns the resource or holds an elevated role.
pub fn check_permissions(actor: &AuthUser, resource_owner: Uuid) -> Result<(), ServiceError> {
    if actor.role.is_elevated() || actor.user_id == resource_owner {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "not authorized to access this resource".to_string(),
        ))
    }
}
