//! Credential-refreshing transport layer.
//!
//! [`AuthTransport`] produces a valid credential for every outgoing call.
//! It refreshes lazily when the cached credential is expired (or about to
//! expire), pushes each refreshed credential to the [`CredentialStore`],
//! and serializes concurrent refreshes behind a mutex so only one refresh
//! is persisted per token transition.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::auth::credential::{Credential, CredentialStore};
use crate::error::{Error, Result};
use crate::http::{classify_response, Authorizer, HttpRequest, Transport};

/// Refresh this long before the recorded expiry; covers clock skew between
/// client and token service.
const EXPIRY_LEEWAY_SECS: i64 = 300;

#[derive(Debug, Default)]
struct AuthState {
    credential: Option<Credential>,
    /// Access-token value most recently handed to the store; persistence
    /// is triggered only when the refreshed value differs.
    last_seen_token: Option<String>,
    /// Set after a 401 so the next obtain refreshes even if the local
    /// expiry says the token is still good.
    force_refresh: bool,
}

/// Authenticated transport: wraps credential refresh and persistence.
pub struct AuthTransport {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    token_url: String,
    client_id: String,
    scope: String,
    state: Mutex<AuthState>,
}

impl AuthTransport {
    /// Create an authenticated transport over `transport`, persisting
    /// refreshed credentials to `store`.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        token_url: String,
        client_id: String,
        scope: String,
    ) -> Self {
        Self {
            transport,
            store,
            token_url,
            client_id,
            scope,
            state: Mutex::new(AuthState::default()),
        }
    }

    /// Produce a currently valid credential, refreshing if needed.
    ///
    /// # Errors
    ///
    /// - [`Error::ReauthRequired`] when no credential is stored or the
    ///   refresh token was rejected,
    /// - [`Error::NetworkFailed`] / [`Error::RetryLater`] from the token
    ///   exchange itself,
    /// - any error from the persistence callback (fail-closed).
    pub async fn obtain_credential(&self) -> Result<Credential> {
        // Held across the refresh exchange: concurrent callers racing to
        // refresh serialize here, and the second caller finds a fresh
        // credential instead of refreshing again.
        let mut state = self.state.lock().await;

        if state.credential.is_none() {
            state.credential = self.store.load()?;
            if let Some(credential) = &state.credential {
                state.last_seen_token = Some(credential.access_token.clone());
            }
        }

        let Some(current) = state.credential.clone() else {
            return Err(Error::ReauthRequired(
                "not logged in, run 'cirrus login'".to_string(),
            ));
        };

        let leeway = Duration::seconds(EXPIRY_LEEWAY_SECS);
        if !state.force_refresh && !current.is_expired_within(leeway) {
            return Ok(current);
        }

        let refreshed = self.refresh_exchange(&current.refresh_token).await?;

        if state.last_seen_token.as_deref() != Some(refreshed.access_token.as_str()) {
            self.store
                .persist(&refreshed)
                .map_err(|e| e.context("persisting refreshed credential"))?;
            state.last_seen_token = Some(refreshed.access_token.clone());
            tracing::debug!("Refreshed credential persisted");
        }

        state.credential = Some(refreshed.clone());
        state.force_refresh = false;

        Ok(refreshed)
    }

    async fn refresh_exchange(&self, refresh_token: &str) -> Result<Credential> {
        let form = format!(
            "client_id={}&grant_type=refresh_token&refresh_token={}&scope={}",
            form_encode(&self.client_id),
            form_encode(refresh_token),
            form_encode(&self.scope),
        );

        let request = HttpRequest {
            method: Method::POST,
            url: self.token_url.clone(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            body: Some(Bytes::from(form)),
        };

        let response = self.transport.send(request).await?;
        if !response.status.is_success() {
            let err = classify_response(&response);
            // A rejected refresh token means the stored credential is
            // dead, whatever the transport-level classification said.
            return Err(match err {
                Error::RetryLater(m) => Error::RetryLater(m),
                Error::NetworkFailed(m) => Error::NetworkFailed(m),
                other => Error::ReauthRequired(other.to_string()),
            });
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e: Error| e.context("token refresh response"))?;

        Ok(Credential {
            access_token: token.access_token,
            // The token service may rotate the refresh token; keep the old
            // one when it does not.
            refresh_token: token
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl Authorizer for AuthTransport {
    async fn bearer(&self) -> Result<Option<String>> {
        Ok(Some(self.obtain_credential().await?.access_token))
    }

    async fn invalidate(&self) {
        self.state.lock().await.force_refresh = true;
    }
}

/// Token endpoint response shape (fixed by the OAuth2 service).
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// Unreserved characters stay literal; everything else is escaped.
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a form value.
pub(crate) fn form_encode(value: &str) -> String {
    utf8_percent_encode(value, FORM).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_encode() {
        assert_eq!(form_encode("abc-123"), "abc-123");
        assert_eq!(
            form_encode("Files.ReadWrite offline_access"),
            "Files.ReadWrite%20offline_access"
        );
        assert_eq!(form_encode("a/b=c"), "a%2Fb%3Dc");
    }
}
