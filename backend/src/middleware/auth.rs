//! Authentication middleware
//!
//! Tokens are issued elsewhere; this layer only verifies them and scopes
//! every request to the company named in the token.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorDetail, ErrorResponse},
    AppState,
};

pub const INVENTORY: &str = "inventory";
pub const READ: &str = "read";
pub const WRITE: &str = "write";

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub permissions: Vec<String>,
}

impl AuthUser {
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        let permission = format!("{}:{}", resource, action);
        self.permissions.contains(&permission)
    }

    /// Fail with `InsufficientPermissions` unless the permission is granted
    pub fn require(&self, resource: &str, action: &str) -> AppResult<()> {
        if self.has_permission(resource, action) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %self.user_id,
                "permission denied: requires {}:{}",
                resource,
                action
            );
            Err(AppError::InsufficientPermissions)
        }
    }
}

/// Validate the bearer token and attach an [`AuthUser`] to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(token) => token,
        None => return unauthorized_response("Missing or invalid Authorization header"),
    };

    let claims = match decode_jwt(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(msg) => return unauthorized_response(&msg),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid user ID in token"),
    };

    let company_id = match Uuid::parse_str(&claims.company_id) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid company ID in token"),
    };

    request.extensions_mut().insert(AuthUser {
        user_id,
        company_id,
        permissions: claims.permissions,
    });

    next.run(request).await
}

/// JWT claims structure
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    sub: String,
    company_id: String,
    #[serde(default)]
    permissions: Vec<String>,
    exp: i64,
    iat: i64,
}

fn decode_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

fn unauthorized_body(message: &str) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            field: None,
        },
    })
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, unauthorized_body(message)).into_response()
}

/// Extractor for authenticated user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    unauthorized_body("Authentication required"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn user(perms: &[&str]) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            permissions: perms.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_require_permission() {
        let reader = user(&["inventory:read"]);
        assert!(reader.require(INVENTORY, READ).is_ok());
        assert!(matches!(
            reader.require(INVENTORY, WRITE),
            Err(AppError::InsufficientPermissions)
        ));
    }

    #[test]
    fn test_decode_round_trip() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            company_id: Uuid::new_v4().to_string(),
            permissions: vec!["inventory:write".to_string()],
            exp: now + 600,
            iat: now,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let decoded = decode_jwt(&token, "test-secret").unwrap();
        assert_eq!(decoded.company_id, claims.company_id);
        assert!(decode_jwt(&token, "other-secret").is_err());
    }
}
