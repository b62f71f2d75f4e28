//! Device-code login state machine behavior.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use cirrus_core::auth::{DeviceCodeFlow, LoginProgress, PendingAuthState};
use cirrus_core::config::ApiConfig;
use cirrus_core::error::Error;

use common::{MemoryCredentialStore, ScriptedTransport};

struct Rig {
    transport: Arc<ScriptedTransport>,
    store: Arc<MemoryCredentialStore>,
    flow: DeviceCodeFlow,
    state_path: PathBuf,
    _temp_dir: TempDir,
}

impl Rig {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let state_path = temp_dir.path().join("pending_login.json");
        let transport = Arc::new(ScriptedTransport::new());
        let store = Arc::new(MemoryCredentialStore::new());

        let api = ApiConfig {
            base_url: "https://api.example.com".to_string(),
            token_url: "https://login.example.com/token".to_string(),
            devicecode_url: "https://login.example.com/devicecode".to_string(),
            client_id: "client-123".to_string(),
            scope: "Files.ReadWrite offline_access".to_string(),
        };

        let flow = DeviceCodeFlow::new(
            Arc::clone(&transport) as _,
            Arc::clone(&store) as _,
            api,
            state_path.clone(),
        );

        Self {
            transport,
            store,
            flow,
            state_path,
            _temp_dir: temp_dir,
        }
    }

    fn seed_pending(&self) {
        let state = PendingAuthState {
            device_code: "dev-code-1".to_string(),
            user_code: "ABCD-1234".to_string(),
            verification_uri: "https://login.example.com/verify".to_string(),
            poll_interval_secs: 5,
            expires_at: Utc::now() + Duration::minutes(10),
        };
        std::fs::write(
            &self.state_path,
            serde_json::to_string(&state).expect("serialize"),
        )
        .expect("seed pending state");
    }

    fn lock_path(&self) -> PathBuf {
        self.state_path.with_extension("lock")
    }
}

#[tokio::test]
async fn test_initiate_persists_device_code() {
    let rig = Rig::new();
    rig.transport.push(
        200,
        r#"{"device_code":"dev-code-1","user_code":"ABCD-1234","verification_uri":"https://login.example.com/verify","expires_in":900,"interval":5,"message":"go to the page"}"#,
    );

    let state = rig.flow.initiate().await.expect("initiate");

    assert_eq!(state.user_code, "ABCD-1234");
    assert_eq!(state.poll_interval_secs, 5);
    assert!(rig.state_path.exists(), "pending record persisted");

    let form = String::from_utf8(
        rig.transport.calls()[0].body.clone().expect("form").to_vec(),
    )
    .expect("utf8");
    assert!(form.contains("client_id=client-123"));
}

#[tokio::test]
async fn test_initiate_while_pending_makes_no_network_call() {
    let rig = Rig::new();
    rig.seed_pending();

    let err = rig.flow.initiate().await.expect_err("already pending");

    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(rig.transport.call_count(), 0);
}

#[tokio::test]
async fn test_advance_still_pending_keeps_state() {
    let rig = Rig::new();
    rig.seed_pending();
    rig.transport.push(
        400,
        r#"{"error":"authorization_pending","error_description":"user has not finished"}"#,
    );

    let progress = rig.flow.advance().await.expect("advance");

    let LoginProgress::Pending(state) = progress else {
        panic!("expected pending, got {progress:?}");
    };
    assert_eq!(state.user_code, "ABCD-1234", "code restated for the user");
    assert!(rig.state_path.exists(), "state retained while pending");

    let form = String::from_utf8(
        rig.transport.calls()[0].body.clone().expect("form").to_vec(),
    )
    .expect("utf8");
    assert!(form.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code"));
    assert!(form.contains("device_code=dev-code-1"));
}

#[tokio::test]
async fn test_advance_declined_deletes_state() {
    let rig = Rig::new();
    rig.seed_pending();
    rig.transport.push(
        400,
        r#"{"error":"authorization_declined","error_description":"user said no"}"#,
    );

    let progress = rig.flow.advance().await.expect("advance");

    assert_eq!(progress, LoginProgress::Declined);
    assert!(!rig.state_path.exists());
    assert!(rig.store.current().is_none());
}

#[tokio::test]
async fn test_advance_expired_code_deletes_state() {
    let rig = Rig::new();
    rig.seed_pending();
    rig.transport.push(
        400,
        r#"{"error":"expired_token","error_description":"device code expired"}"#,
    );

    let progress = rig.flow.advance().await.expect("advance");

    assert_eq!(progress, LoginProgress::Expired);
    assert!(!rig.state_path.exists());
}

#[tokio::test]
async fn test_advance_success_persists_credential() {
    let rig = Rig::new();
    rig.seed_pending();
    rig.transport.push(
        200,
        r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":3600}"#,
    );

    let progress = rig.flow.advance().await.expect("advance");

    assert_eq!(progress, LoginProgress::Authenticated);
    let credential = rig.store.current().expect("credential persisted");
    assert_eq!(credential.access_token, "at-1");
    assert_eq!(credential.refresh_token, "rt-1");
    assert!(!rig.state_path.exists(), "pending state deleted on success");
}

#[tokio::test]
async fn test_advance_without_pending_login() {
    let rig = Rig::new();

    let err = rig.flow.advance().await.expect_err("nothing pending");

    assert!(matches!(err, Error::ReauthRequired(_)));
    assert_eq!(rig.transport.call_count(), 0);
}

#[tokio::test]
async fn test_logout_removes_state_and_lock() {
    let rig = Rig::new();
    rig.seed_pending();

    rig.flow.logout().expect("logout");

    assert!(!rig.state_path.exists(), "state file removed");
    assert!(!rig.lock_path().exists(), "lock file removed");
    assert!(rig.store.current().is_none());

    // Idempotent.
    rig.flow.logout().expect("logout again");
}
