//! High-level client tying the layers together.
//!
//! [`Client`] owns the transport, credential store, and session store, and
//! hands out configured engines and flows. The CLI talks only to this
//! type.

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{
    AuthTransport, CredentialStore, DeviceCodeFlow, FileCredentialStore, LoginProgress,
    PendingAuthState, PENDING_LOGIN_FILE,
};
use crate::config::Config;
use crate::error::Result;
use crate::http::{NoAuth, RequestExecutor, ReqwestTransport, RetryPolicy, Transport};
use crate::session::{SessionStore, TransferSession};
use crate::transfer::{DownloadEngine, UploadEngine};

/// A configured cloud-storage client.
pub struct Client {
    config: Config,
    api_executor: Arc<RequestExecutor>,
    chunk_executor: Arc<RequestExecutor>,
    store: Arc<SessionStore>,
    device_flow: DeviceCodeFlow,
}

impl Client {
    /// Create a client with production wiring: a real HTTP transport, the
    /// file-backed credential store, and the default sessions directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory cannot be created.
    pub fn new(config: Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new());
        let credentials: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new());
        let store = Arc::new(SessionStore::new()?);
        let pending_login = Config::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(PENDING_LOGIN_FILE);

        Ok(Self::assemble(
            config,
            transport,
            credentials,
            store,
            pending_login,
        ))
    }

    /// Create a client from explicit parts; used by tests to inject a
    /// scripted transport and temp directories.
    #[must_use]
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        store: Arc<SessionStore>,
        pending_login_path: PathBuf,
    ) -> Self {
        Self::assemble(config, transport, credentials, store, pending_login_path)
    }

    fn assemble(
        config: Config,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        store: Arc<SessionStore>,
        pending_login_path: PathBuf,
    ) -> Self {
        let policy = RetryPolicy {
            max_attempts: config.retry.max_attempts,
            base_delay: config.retry.base_delay(),
            max_delay: config.retry.max_delay(),
        };

        let auth = Arc::new(AuthTransport::new(
            Arc::clone(&transport),
            Arc::clone(&credentials),
            config.api.token_url.clone(),
            config.api.client_id.clone(),
            config.api.scope.clone(),
        ));

        let api_executor = Arc::new(RequestExecutor::new(
            Arc::clone(&transport),
            auth,
            policy.clone(),
        ));
        let chunk_executor = Arc::new(RequestExecutor::new(
            Arc::clone(&transport),
            Arc::new(NoAuth),
            policy,
        ));

        let device_flow = DeviceCodeFlow::new(
            Arc::clone(&transport),
            credentials,
            config.api.clone(),
            pending_login_path,
        );

        Self {
            config,
            api_executor,
            chunk_executor,
            store,
            device_flow,
        }
    }

    /// Build an upload engine for one transfer.
    #[must_use]
    pub fn upload_engine(&self) -> UploadEngine {
        UploadEngine::new(
            Arc::clone(&self.api_executor),
            Arc::clone(&self.chunk_executor),
            Arc::clone(&self.store),
            self.config.api.base_url.clone(),
            self.config.transfer.chunk_size,
        )
    }

    /// Build a download engine for one transfer.
    #[must_use]
    pub fn download_engine(&self) -> DownloadEngine {
        DownloadEngine::new(
            Arc::clone(&self.api_executor),
            Arc::clone(&self.chunk_executor),
            Arc::clone(&self.store),
            self.config.api.base_url.clone(),
            self.config.transfer.chunk_size,
        )
    }

    /// Begin a device-code login.
    pub async fn initiate_login(&self) -> Result<PendingAuthState> {
        self.device_flow.initiate().await
    }

    /// Make one token-exchange attempt for a pending login.
    pub async fn advance_login(&self) -> Result<LoginProgress> {
        self.device_flow.advance().await
    }

    /// Forget the pending login and stored credential.
    pub fn logout(&self) -> Result<()> {
        self.device_flow.logout()
    }

    /// The pending login, if one exists.
    pub fn pending_login(&self) -> Result<Option<PendingAuthState>> {
        self.device_flow.pending()
    }

    /// List resumable session records.
    pub fn sessions(&self) -> Result<Vec<TransferSession>> {
        self.store.list()
    }
}
