//! Admission of realtime channels and API requests.

use murmur_db::DbPool;
use murmur_identity::{get_account, IdentityError, TokenError, TokenService};
use murmur_types::{Principal, UserId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::ApiError;

/// Why a credential was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("unknown account {0}")]
    UnknownAccount(UserId),
    #[error("account {0} is disabled")]
    DisabledAccount(UserId),
    #[error("authentication timed out")]
    TimedOut,
    #[error("authentication failed internally: {0}")]
    Internal(String),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Internal(detail) => ApiError::Internal(detail),
            // Callers learn only that they were refused.
            _ => ApiError::Unauthorized("invalid or missing credentials".to_string()),
        }
    }
}

/// Turns a raw bearer token into a [`Principal`].
///
/// The token is verified by the configured [`TokenService`] and its subject
/// must resolve to a known, enabled account. The whole check is bounded by a
/// timeout. It has no side effects; callers register presence themselves
/// once the channel is established.
#[derive(Clone)]
pub struct ChannelAuthenticator {
    tokens: Arc<dyn TokenService>,
    pool: DbPool,
    timeout: Duration,
}

impl ChannelAuthenticator {
    pub fn new(tokens: Arc<dyn TokenService>, pool: DbPool, timeout: Duration) -> Self {
        Self {
            tokens,
            pool,
            timeout,
        }
    }

    pub async fn authenticate(&self, raw_token: Option<&str>) -> Result<Principal, AuthError> {
        let token = raw_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        tokio::time::timeout(self.timeout, self.resolve(token))
            .await
            .map_err(|_| AuthError::TimedOut)?
    }

    async fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        let user_id = self.tokens.validate(token)?;

        let pool = self.pool.clone();
        let account = tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| AuthError::Internal(format!("db connection failed: {e}")))?;
            match get_account(&conn, user_id) {
                Ok(account) => Ok(account),
                Err(IdentityError::NotFound(id)) => Err(AuthError::UnknownAccount(id)),
                Err(e) => Err(AuthError::Internal(e.to_string())),
            }
        })
        .await
        .map_err(|e| AuthError::Internal(format!("task join error: {e}")))??;

        if !account.enabled {
            return Err(AuthError::DisabledAccount(account.id));
        }
        Ok(Principal::new(account.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_db::{create_pool, run_migrations, DbRuntimeSettings};
    use murmur_identity::{upsert_account, SignedTokenService};

    fn setup(dir: &tempfile::TempDir) -> (ChannelAuthenticator, SignedTokenService) {
        let path = dir.path().join("auth.db");
        let pool = create_pool(path.to_str().expect("utf8"), DbRuntimeSettings::default())
            .expect("pool");
        {
            let conn = pool.get().expect("conn");
            run_migrations(&conn).expect("migrations");
            upsert_account(&conn, 5, "ada", true).expect("ada");
            upsert_account(&conn, 6, "mallory", false).expect("mallory");
        }
        let tokens = SignedTokenService::new(b"unit-test-secret".to_vec());
        let auth = ChannelAuthenticator::new(
            Arc::new(tokens.clone()),
            pool,
            Duration::from_secs(5),
        );
        (auth, tokens)
    }

    #[tokio::test]
    async fn valid_token_yields_principal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (auth, tokens) = setup(&dir);
        let token = tokens.issue(5, 60).expect("issue");
        let principal = auth.authenticate(Some(&token)).await.expect("admitted");
        assert_eq!(principal, Principal::new(5));
    }

    #[tokio::test]
    async fn missing_or_blank_token_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (auth, _) = setup(&dir);
        assert!(matches!(
            auth.authenticate(None).await,
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            auth.authenticate(Some("  ")).await,
            Err(AuthError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (auth, tokens) = setup(&dir);
        let token = tokens
            .issue_expiring_at(5, chrono::Utc::now().timestamp() - 1)
            .expect("issue");
        assert!(matches!(
            auth.authenticate(Some(&token)).await,
            Err(AuthError::InvalidToken(TokenError::Expired(_)))
        ));
    }

    #[tokio::test]
    async fn unknown_and_disabled_accounts_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (auth, tokens) = setup(&dir);

        let ghost = tokens.issue(404, 60).expect("issue");
        assert!(matches!(
            auth.authenticate(Some(&ghost)).await,
            Err(AuthError::UnknownAccount(404))
        ));

        let disabled = tokens.issue(6, 60).expect("issue");
        let err = auth.authenticate(Some(&disabled)).await.unwrap_err();
        assert!(matches!(err, AuthError::DisabledAccount(6)));
        assert_eq!(
            ApiError::from(err).status(),
            axum::http::StatusCode::UNAUTHORIZED
        );
    }
}
