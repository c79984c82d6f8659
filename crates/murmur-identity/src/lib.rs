//! Account lookup and bearer-token verification for the Murmur realtime core.
//!
//! Murmur does not own user accounts or mint login credentials. It keeps a
//! local mirror of the account directory (`accounts` table) so a token
//! subject can be resolved to a known, enabled user, and it consumes tokens
//! through the [`TokenService`] trait. [`SignedTokenService`] is the
//! HMAC-SHA256 implementation the server ships with.

mod accounts;
mod token;

pub use accounts::{
    get_account, get_account_by_username, set_account_enabled, upsert_account, Account,
};
pub use token::{SignedTokenService, TokenError, TokenService};

use murmur_types::UserId;
use thiserror::Error;

/// Errors produced by account directory operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("account not found: {0}")]
    NotFound(UserId),
    #[error("username must not be blank")]
    BlankUsername,
}
