//! Session authentication.
//!
//! Access/refresh token pairs are signed with separate secrets and backed by
//! revocation records in the key-value store.

pub mod gate;
pub mod handlers;
pub mod store;
pub mod tokens;
pub mod users;

pub use gate::{AccessAuth, AuthGate, Identity, RefreshAuth};
pub use store::TokenStore;
pub use tokens::{Claims, CredentialPair, TokenIssuer, TokenKind, ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS};
pub use users::UserStore;
