//! Authentication routes
//!
//! - POST /auth/register - Create credentials
//! - POST /auth/login    - Authenticate and get JWT tokens
//! - POST /auth/refresh  - Exchange a refresh token for a new access token
//! - POST /auth/logout   - Revoke outstanding refresh tokens
//! - GET  /auth/me       - Current account details

use bson::doc;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, TokenInput};
use crate::db::schemas::UserDoc;
use crate::routes::helpers::{error_response, json_response, parse_json_body};
use crate::server::http::authenticate;
use crate::server::AppState;
use crate::types::UltimaError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub identifier: String,
    pub password: String,
    #[serde(default = "default_identifier_type")]
    pub identifier_type: String,
}

fn default_identifier_type() -> String {
    "email".to_string()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub user_id: String,
    pub identifier: String,
    pub expires_in: u64,
}

/// Account details as exposed to the owner; credentials never leave
/// the user document
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub identifier: String,
    pub identifier_type: String,
    pub is_active: bool,
    pub created_at: String,
}

impl MeResponse {
    fn from_doc(doc: &UserDoc) -> Self {
        Self {
            user_id: doc._id.map(|id| id.to_hex()).unwrap_or_default(),
            identifier: doc.identifier.clone(),
            identifier_type: doc.identifier_type.clone(),
            is_active: doc.is_active,
            created_at: doc
                .metadata
                .created_at
                .and_then(|ts| ts.try_to_rfc3339_string().ok())
                .unwrap_or_default(),
        }
    }
}

/// Handle /auth/* requests; returns None for unknown paths
pub async fn handle_auth_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<Full<Bytes>>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::POST, "/auth/register") => handle_register(req, state).await,
        (Method::POST, "/auth/login") => handle_login(req, state).await,
        (Method::POST, "/auth/refresh") => handle_refresh(req, state).await,
        (Method::POST, "/auth/logout") => handle_logout(req, state).await,
        (Method::GET, "/auth/me") => handle_me(req, state).await,
        _ => return None,
    };

    Some(response.unwrap_or_else(|e| error_response(&e)))
}

async fn handle_register(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, UltimaError> {
    let body: RegisterRequest = parse_json_body(req).await?;

    if body.identifier.trim().is_empty() {
        return Err(UltimaError::BadRequest("Identifier is required".into()));
    }
    if body.password.len() < 8 {
        return Err(UltimaError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }

    if state
        .users
        .find_one(doc! { "identifier": &body.identifier })
        .await?
        .is_some()
    {
        return Err(UltimaError::BadRequest(
            "An account with this identifier already exists".into(),
        ));
    }

    let password_hash = hash_password(&body.password)?;
    let user = UserDoc::new(body.identifier.clone(), body.identifier_type, password_hash);
    let user_id = state.users.insert_one(user).await?;

    info!(identifier = %body.identifier, "user registered");

    let input = TokenInput {
        user_id: user_id.to_hex(),
        identifier: body.identifier.clone(),
        token_version: 1,
    };
    let token = state.jwt.generate_token(&input)?;
    let refresh_token = state.jwt.generate_refresh_token(&input)?;

    Ok(json_response(
        StatusCode::CREATED,
        &AuthResponse {
            token,
            refresh_token: Some(refresh_token),
            user_id: user_id.to_hex(),
            identifier: body.identifier,
            expires_in: state.args.jwt_expiry_seconds,
        },
    ))
}

async fn handle_login(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, UltimaError> {
    let body: LoginRequest = parse_json_body(req).await?;

    let user = state
        .users
        .find_one(doc! { "identifier": &body.identifier })
        .await?
        .ok_or_else(|| UltimaError::Unauthorized("Invalid credentials".into()))?;

    if !user.is_active {
        warn!(identifier = %body.identifier, "login attempt on inactive account");
        return Err(UltimaError::Unauthorized("Account is disabled".into()));
    }

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(UltimaError::Unauthorized("Invalid credentials".into()));
    }

    let user_id = user
        ._id
        .ok_or_else(|| UltimaError::Internal("User without id".into()))?;

    let input = TokenInput {
        user_id: user_id.to_hex(),
        identifier: user.identifier.clone(),
        token_version: user.token_version,
    };
    let token = state.jwt.generate_token(&input)?;
    let refresh_token = state.jwt.generate_refresh_token(&input)?;

    info!(identifier = %user.identifier, "user logged in");

    Ok(json_response(
        StatusCode::OK,
        &AuthResponse {
            token,
            refresh_token: Some(refresh_token),
            user_id: user_id.to_hex(),
            identifier: user.identifier,
            expires_in: state.args.jwt_expiry_seconds,
        },
    ))
}

async fn handle_refresh(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, UltimaError> {
    let body: RefreshRequest = parse_json_body(req).await?;

    let claims = state.jwt.validate_token(&body.refresh_token)?;
    if !claims.refresh {
        return Err(UltimaError::Unauthorized(
            "Access token cannot be used for refresh".into(),
        ));
    }

    let user = state
        .users
        .find_one(doc! { "identifier": &claims.identifier })
        .await?
        .ok_or_else(|| UltimaError::Unauthorized("Account no longer exists".into()))?;

    // Tokens minted before a version bump are rejected
    if user.token_version != claims.version || !user.is_active {
        return Err(UltimaError::Unauthorized("Token has been revoked".into()));
    }

    let input = TokenInput {
        user_id: claims.user_id.clone(),
        identifier: claims.identifier.clone(),
        token_version: user.token_version,
    };
    let token = state.jwt.generate_token(&input)?;

    Ok(json_response(
        StatusCode::OK,
        &AuthResponse {
            token,
            refresh_token: None,
            user_id: claims.user_id,
            identifier: claims.identifier,
            expires_in: state.args.jwt_expiry_seconds,
        },
    ))
}

async fn handle_logout(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, UltimaError> {
    let user_id = authenticate(&state, &req)?;

    // Bumping the version invalidates every outstanding refresh token;
    // the current access token simply lapses at its expiry
    state
        .users
        .update_one(
            doc! { "_id": user_id },
            doc! { "$inc": { "token_version": 1 } },
        )
        .await?;

    info!(user = %user_id, "user logged out");

    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "loggedOut": true }),
    ))
}

async fn handle_me(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, UltimaError> {
    let user_id = authenticate(&state, &req)?;

    let user = state
        .users
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| UltimaError::NotFound("Account not found".into()))?;

    Ok(json_response(StatusCode::OK, &MeResponse::from_doc(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn test_me_view_never_exposes_credentials() {
        let mut user = UserDoc::new(
            "alice@example.com".into(),
            "email".into(),
            "$argon2id$v=19$m=19456,t=2,p=1$abc$def".into(),
        );
        user._id = Some(ObjectId::new());

        let view = MeResponse::from_doc(&user);
        let json = serde_json::to_string(&view).unwrap();

        assert!(json.contains("alice@example.com"));
        assert!(json.contains("\"identifierType\":\"email\""));
        assert!(json.contains("\"isActive\":true"));
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("passwordHash"));
        assert!(!json.contains("tokenVersion"));
    }

    #[test]
    fn test_me_view_formats_created_at() {
        let mut user = UserDoc::new("bob".into(), "username".into(), "hash".into());
        user._id = Some(ObjectId::new());

        let view = MeResponse::from_doc(&user);
        assert!(view.created_at.ends_with('Z'));
    }
}
