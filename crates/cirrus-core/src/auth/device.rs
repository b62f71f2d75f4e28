//! OAuth2 device-code login flow.
//!
//! A stateless CLI process cannot sit in a poll loop waiting for the user
//! to finish authorizing in their browser, so the flow is split across
//! invocations: [`DeviceCodeFlow::initiate`] obtains and persists a device
//! code, and each later [`DeviceCodeFlow::advance`] makes exactly one
//! token-exchange attempt, reporting pending / declined / expired /
//! authenticated. The pending record is a process-wide singleton guarded
//! by the same non-blocking lock discipline as session records.

use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::credential::{Credential, CredentialStore};
use crate::auth::transport::{form_encode, TokenResponse};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::http::{classify_response, HttpRequest, Transport};
use crate::session::lockfile;

/// Filename of the singleton pending-login record (in the config dir).
pub const PENDING_LOGIN_FILE: &str = "pending_login.json";

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// A login that has been initiated but not yet completed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthState {
    /// Opaque code the client exchanges for tokens
    pub device_code: String,
    /// Short code the user types at the verification page
    pub user_code: String,
    /// Page where the user enters `user_code`
    pub verification_uri: String,
    /// Minimum seconds between token-exchange attempts
    pub poll_interval_secs: u64,
    /// Instant after which the device code is dead
    pub expires_at: DateTime<Utc>,
}

/// Outcome of one [`DeviceCodeFlow::advance`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginProgress {
    /// The user has not finished authorizing; state is retained.
    Pending(PendingAuthState),
    /// The user declined; state has been deleted.
    Declined,
    /// The device code expired before the user finished; state deleted.
    Expired,
    /// Login completed; the credential has been persisted.
    Authenticated,
}

/// Device-code initiation response (shape fixed by the OAuth2 service).
#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: i64,
    interval: u64,
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
}

/// Interactive-login state machine.
pub struct DeviceCodeFlow {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    api: ApiConfig,
    state_path: PathBuf,
}

impl DeviceCodeFlow {
    /// Create a flow persisting pending state at `state_path`.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        api: ApiConfig,
        state_path: PathBuf,
    ) -> Self {
        Self {
            transport,
            store,
            api,
            state_path,
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.state_path.with_extension("lock")
    }

    /// Begin a new device-code login.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Conflict`] (no network call made) if a login is
    /// already pending; exactly one concurrent attempt is allowed, which
    /// prevents orphaned device codes and duplicate user prompts.
    pub async fn initiate(&self) -> Result<PendingAuthState> {
        if self.state_path.exists() {
            return Err(Error::Conflict(
                "a login is already pending, run 'cirrus login --check' or 'cirrus logout'"
                    .to_string(),
            ));
        }

        let form = format!(
            "client_id={}&scope={}",
            form_encode(&self.api.client_id),
            form_encode(&self.api.scope),
        );
        let response = self
            .transport
            .send(HttpRequest {
                method: Method::POST,
                url: self.api.devicecode_url.clone(),
                headers: vec![(
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                )],
                body: Some(Bytes::from(form)),
            })
            .await?;

        if !response.status.is_success() {
            return Err(classify_response(&response).context("initiating device login"));
        }

        let device: DeviceCodeResponse = response
            .json()
            .map_err(|e: Error| e.context("device code response"))?;

        let state = PendingAuthState {
            device_code: device.device_code,
            user_code: device.user_code,
            verification_uri: device.verification_uri,
            poll_interval_secs: device.interval,
            expires_at: Utc::now() + Duration::seconds(device.expires_in),
        };

        self.save_state(&state)?;

        tracing::info!(user_code = %state.user_code, "Device login initiated");
        Ok(state)
    }

    /// Make exactly one token-exchange attempt for the pending login.
    ///
    /// Never loops or sleeps; callers re-invoke on a later run.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ReauthRequired`] if no login is pending, or
    /// propagates classification/persistence failures.
    pub async fn advance(&self) -> Result<LoginProgress> {
        let Some(state) = self.load_state()? else {
            return Err(Error::ReauthRequired(
                "no login in progress, run 'cirrus login'".to_string(),
            ));
        };

        if state.expires_at <= Utc::now() {
            self.delete_state()?;
            return Ok(LoginProgress::Expired);
        }

        let form = format!(
            "grant_type={}&client_id={}&device_code={}",
            form_encode(DEVICE_CODE_GRANT),
            form_encode(&self.api.client_id),
            form_encode(&state.device_code),
        );
        let response = self
            .transport
            .send(HttpRequest {
                method: Method::POST,
                url: self.api.token_url.clone(),
                headers: vec![(
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                )],
                body: Some(Bytes::from(form)),
            })
            .await?;

        if response.status.is_success() {
            let token: TokenResponse = response
                .json()
                .map_err(|e: Error| e.context("token response"))?;

            let credential = Credential {
                access_token: token.access_token,
                refresh_token: token.refresh_token.unwrap_or_default(),
                expires_at: Utc::now() + Duration::seconds(token.expires_in),
            };

            // Persist first: losing the pending record is recoverable,
            // losing a minted credential is not.
            self.store.persist(&credential)?;
            self.delete_state()?;

            tracing::info!("Device login completed");
            return Ok(LoginProgress::Authenticated);
        }

        match classify_response(&response) {
            Error::AuthorizationPending(_) => Ok(LoginProgress::Pending(state)),
            Error::AuthorizationDeclined(_) => {
                self.delete_state()?;
                Ok(LoginProgress::Declined)
            }
            Error::TokenExpired(_) => {
                self.delete_state()?;
                Ok(LoginProgress::Expired)
            }
            other => Err(other.context("advancing device login")),
        }
    }

    /// Forget the pending login and the stored credential. Idempotent.
    pub fn logout(&self) -> Result<()> {
        self.delete_state()?;
        self.store.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// The pending login, if one exists.
    pub fn pending(&self) -> Result<Option<PendingAuthState>> {
        self.load_state()
    }

    fn save_state(&self, state: &PendingAuthState) -> Result<()> {
        let _guard = lockfile::acquire(&self.lock_path())?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Internal(format!("failed to serialize pending login: {e}")))?;
        crate::session::write_atomic(&self.state_path, json.as_bytes())
    }

    fn load_state(&self) -> Result<Option<PendingAuthState>> {
        let _guard = lockfile::acquire(&self.lock_path())?;

        if !self.state_path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.state_path)
            .map_err(|e| Error::Internal(format!("failed to read pending login: {e}")))?;
        let state = serde_json::from_str(&contents)
            .map_err(|e| Error::Internal(format!("failed to parse pending login: {e}")))?;

        Ok(Some(state))
    }

    fn delete_state(&self) -> Result<()> {
        let lock_path = self.lock_path();

        {
            let _guard = lockfile::acquire(&lock_path)?;
            match std::fs::remove_file(&self.state_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Internal(format!(
                        "failed to delete pending login: {e}"
                    )));
                }
            }
        }

        let _ = std::fs::remove_file(&lock_path);
        Ok(())
    }
}
