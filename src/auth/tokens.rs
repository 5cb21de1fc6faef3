use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AppError, AuthError};

pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Cookie carrying this kind of token.
    pub fn cookie_name(self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }

    pub fn ttl_secs(self) -> i64 {
        match self {
            TokenKind::Access => ACCESS_TOKEN_TTL_SECS,
            TokenKind::Refresh => REFRESH_TOKEN_TTL_SECS,
        }
    }
}

/// Claims carried by both token kinds. Every field is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub kind: TokenKind,
    /// Revocation identifier, mirrored in the token store.
    pub tid: Uuid,
    /// Owner identity.
    pub sub: String,
    pub exp: i64,
}

/// A freshly minted access/refresh pair for one owner.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub owner: String,
    pub access_token: String,
    pub access_token_id: Uuid,
    pub access_expires: i64,
    pub refresh_token: String,
    pub refresh_token_id: Uuid,
    pub refresh_expires: i64,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Mints and verifies HS256 tokens. Access and refresh tokens use separate secrets.
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        // `algorithms` is exactly [HS256]; any other `alg` header fails verification.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: SigningKeys::from_secret(&config.access_secret),
            refresh: SigningKeys::from_secret(&config.refresh_secret),
            validation,
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Mints a new pair with fresh, independent revocation identifiers.
    pub fn issue(&self, owner: &str) -> Result<CredentialPair, AppError> {
        let now = Utc::now();
        let access_token_id = Uuid::new_v4();
        let refresh_token_id = Uuid::new_v4();
        let access_expires = (now + Duration::seconds(ACCESS_TOKEN_TTL_SECS)).timestamp();
        let refresh_expires = (now + Duration::seconds(REFRESH_TOKEN_TTL_SECS)).timestamp();

        let access_token = self.sign(TokenKind::Access, access_token_id, owner, access_expires)?;
        let refresh_token = self.sign(TokenKind::Refresh, refresh_token_id, owner, refresh_expires)?;

        Ok(CredentialPair {
            owner: owner.to_string(),
            access_token,
            access_token_id,
            access_expires,
            refresh_token,
            refresh_token_id,
            refresh_expires,
        })
    }

    fn sign(&self, kind: TokenKind, tid: Uuid, owner: &str, exp: i64) -> Result<String, AppError> {
        let claims = Claims { kind, tid, sub: owner.to_string(), exp };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)?;
        Ok(token)
    }

    /// Verifies signature, algorithm and expiry, then decodes the typed claims.
    ///
    /// Header, signature and expiry failures are `Unauthorized`. A correctly signed
    /// token whose claims are missing or mistyped is an internal error.
    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, AppError> {
        // an unreadable header means nothing was verified yet
        decode_header(token).map_err(|e| {
            debug!(?kind, error = %e, "token header rejected");
            AppError::AuthError(AuthError::InvalidToken)
        })?;

        let data = decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::AuthError(AuthError::TokenExpired),
                ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) | ErrorKind::Utf8(_) => {
                    AppError::InternalError(format!("malformed {:?} token claims: {}", kind, e))
                }
                _ => {
                    debug!(?kind, error = %e, "token verification failed");
                    AppError::AuthError(AuthError::InvalidToken)
                }
            })?;

        let claims = data.claims;
        if claims.kind != kind {
            return Err(AppError::InternalError(format!(
                "token signed as {:?} declares kind {:?}",
                kind, claims.kind
            )));
        }
        if claims.sub.is_empty() || claims.tid.is_nil() {
            return Err(AppError::InternalError(format!("empty identity in {:?} token", kind)));
        }
        Ok(claims)
    }
}
