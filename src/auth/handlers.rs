use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::gate::{AccessAuth, RefreshAuth};
use super::tokens::{CredentialPair, TokenKind};
use crate::error::{AppError, AuthError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
}

fn session_cookie<'a>(kind: TokenKind, value: String, max_age_secs: i64, path: &str) -> Cookie<'a> {
    Cookie::build(kind.cookie_name(), value)
        .path(path.to_string())
        .max_age(CookieDuration::seconds(max_age_secs))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .finish()
}

/// Mints a pair, records it, and only then builds the response.
async fn issue_session(state: &AppState, owner: &str, mut response: actix_web::HttpResponseBuilder) -> Result<HttpResponse, AppError> {
    let pair: CredentialPair = state.issuer.issue(owner)?;
    if let Err(e) = state.tokens.set_token(&pair).await {
        error!(owner = %owner, error = %e, "failed to record token pair");
        return Err(e);
    }
    info!(owner = %owner, access_id = %pair.access_token_id, "issued session");

    let path = &state.config.server.api_prefix;
    Ok(response
        .cookie(session_cookie(TokenKind::Access, pair.access_token.clone(), TokenKind::Access.ttl_secs(), path))
        .cookie(session_cookie(TokenKind::Refresh, pair.refresh_token.clone(), TokenKind::Refresh.ttl_secs(), path))
        .json(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }))
}

pub async fn register(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!(owner = %req.username, "registration request");
    state.users.register(&req.username, &req.password).await?;
    issue_session(&state, &req.username, HttpResponse::Created()).await
}

pub async fn login(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if let Err(e) = state.users.verify(&req.username, &req.password).await {
        info!(owner = %req.username, "login failed");
        return Err(e);
    }
    issue_session(&state, &req.username, HttpResponse::Ok()).await
}

/// Revokes exactly the presented access token; other sessions of the user stay valid.
pub async fn logout(
    auth: AccessAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    match state.tokens.del_token(auth.token_id).await {
        Ok(()) => {}
        // lost a race with a concurrent logout of the same session
        Err(e) if e.is_not_found() => return Err(AuthError::Revoked.into()),
        Err(e) => return Err(e),
    }
    info!(owner = %auth.owner, token_id = %auth.token_id, "logged out");

    let path = &state.config.server.api_prefix;
    Ok(HttpResponse::Ok()
        .cookie(session_cookie(TokenKind::Access, String::new(), 0, path))
        .cookie(session_cookie(TokenKind::Refresh, String::new(), 0, path))
        .json(serde_json::json!({
            "message": "Successfully logged out"
        })))
}

/// The presented refresh token was already consumed by the extractor.
pub async fn refresh_token(
    auth: RefreshAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!(owner = %auth.owner, "rotating refresh token");
    issue_session(&state, &auth.owner, HttpResponse::Ok()).await
}
