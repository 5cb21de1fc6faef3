//! Request authentication.
//!
//! A request moves through: extract token -> verify signature/expiry -> typed claims
//! -> revocation record lookup -> (refresh only) rotation delete -> authorized.
//! Any failure rejects the request before a handler runs.

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::store::TokenStore;
use super::tokens::{TokenIssuer, TokenKind};
use crate::error::{AppError, AuthError};
use crate::AppState;

/// Identity bound to a request that passed the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub owner: String,
    /// Revocation id of the presented access token; `None` for refresh requests.
    pub token_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct AuthGate {
    issuer: Arc<TokenIssuer>,
    tokens: TokenStore,
}

impl AuthGate {
    pub fn new(issuer: Arc<TokenIssuer>, tokens: TokenStore) -> Self {
        Self { issuer, tokens }
    }

    pub async fn authorize(&self, kind: TokenKind, token: Option<&str>) -> Result<Identity, AppError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::MissingToken)?;
        let claims = self.issuer.verify(kind, token)?;

        if !self.tokens.has_token(claims.tid, &claims.sub).await? {
            debug!(owner = %claims.sub, token_id = %claims.tid, ?kind, "token has no revocation record");
            return Err(AuthError::Revoked.into());
        }

        match kind {
            TokenKind::Access => Ok(Identity { owner: claims.sub, token_id: Some(claims.tid) }),
            TokenKind::Refresh => {
                // Consume before the handler runs. Only one caller can observe the delete.
                match self.tokens.del_token(claims.tid).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        warn!(owner = %claims.sub, token_id = %claims.tid, "refresh token consumed concurrently");
                        return Err(AuthError::TokenReused.into());
                    }
                    Err(e) => return Err(e),
                }
                debug!(owner = %claims.sub, token_id = %claims.tid, "refresh token rotated out");
                Ok(Identity { owner: claims.sub, token_id: None })
            }
        }
    }
}

fn authorize_request(req: &HttpRequest, kind: TokenKind) -> LocalBoxFuture<'static, Result<Identity, AppError>> {
    let gate = req.app_data::<web::Data<AppState>>().map(|state| state.gate.clone());
    let token = req.cookie(kind.cookie_name()).map(|c| c.value().to_string());

    Box::pin(async move {
        let gate = gate.ok_or_else(|| AppError::InternalError("application state not configured".into()))?;
        gate.authorize(kind, token.as_deref()).await.map_err(|e| {
            match &e {
                AppError::AuthError(reason) => debug!(?kind, %reason, "request rejected"),
                other => warn!(?kind, error = %other, "request rejected with internal error"),
            }
            e
        })
    })
}

/// Extractor for handlers that require a live access token.
#[derive(Debug, Clone)]
pub struct AccessAuth {
    pub owner: String,
    pub token_id: Uuid,
}

impl FromRequest for AccessAuth {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let fut = authorize_request(req, TokenKind::Access);
        Box::pin(async move {
            let identity = fut.await?;
            let token_id = identity
                .token_id
                .ok_or_else(|| AppError::InternalError("access identity without token id".into()))?;
            Ok(AccessAuth { owner: identity.owner, token_id })
        })
    }
}

/// Extractor for the refresh endpoint. Extraction consumes the refresh token.
#[derive(Debug, Clone)]
pub struct RefreshAuth {
    pub owner: String,
}

impl FromRequest for RefreshAuth {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let fut = authorize_request(req, TokenKind::Refresh);
        Box::pin(async move {
            let identity = fut.await?;
            Ok(RefreshAuth { owner: identity.owner })
        })
    }
}
