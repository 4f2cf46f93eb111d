// Authentication extractor for the admin management endpoints

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::auth::{
    error::AuthError,
    token::{Role, TokenService},
};

/// Admin session extractor for management routes
///
/// Rejects requests without a valid bearer token, and authenticated requests
/// whose token does not carry the admin role.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub user_id: i32,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidToken)?;

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| AuthError::Config("JWT_SECRET not configured".to_string()))?;

        let token_service = TokenService::new(jwt_secret);
        let claims = token_service.validate_access_token(token)?;

        if claims.role != Role::Admin {
            tracing::warn!(
                "Authorization failed: user_id={}, role={}, endpoint requires admin",
                claims.sub,
                claims.role
            );
            return Err(AuthError::NotAuthorized {
                required: Role::Admin,
                actual: claims.role,
            });
        }

        Ok(AdminSession {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}
