//! Shared test doubles for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, StatusCode};

use cirrus_core::auth::{Credential, CredentialStore};
use cirrus_core::error::{Error, Result};
use cirrus_core::http::{HttpRequest, HttpResponse, Transport};

/// One request observed by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl RecordedCall {
    /// Look up a request header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// [`Transport`] that replays a scripted response sequence and records
/// every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with the given status and JSON body.
    pub fn push(&self, status: u16, body: &str) {
        self.push_response(HttpResponse {
            status: StatusCode::from_u16(status).expect("valid status"),
            headers: Vec::new(),
            body: Bytes::from(body.to_string()),
        });
    }

    /// Queue a response with headers.
    pub fn push_with_headers(&self, status: u16, headers: &[(&str, &str)], body: &[u8]) {
        self.push_response(HttpResponse {
            status: StatusCode::from_u16(status).expect("valid status"),
            headers: headers
                .iter()
                .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
                .collect(),
            body: Bytes::from(body.to_vec()),
        });
    }

    /// Queue a fully built response.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Ok(response));
    }

    /// Queue a transport-level failure.
    pub fn push_network_error(&self, message: &str) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Err(Error::NetworkFailed(message.to_string())));
    }

    /// Requests observed so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Number of requests observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            method: req.method.clone(),
            url: req.url.clone(),
            headers: req.headers.clone(),
            body: req.body.clone(),
        });

        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted request: {} {}", req.method, req.url))
    }
}

/// In-memory [`CredentialStore`] with an optional failing persist path.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<Credential>>,
    fail_persist: bool,
    persist_calls: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
            ..Self::default()
        }
    }

    /// A store whose persist callback always fails.
    pub fn failing() -> Self {
        Self {
            fail_persist: true,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<Credential> {
        self.credential.lock().expect("credential lock").clone()
    }

    pub fn persist_count(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.current())
    }

    fn persist(&self, credential: &Credential) -> Result<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_persist {
            return Err(Error::Internal("persist callback failed".to_string()));
        }
        *self.credential.lock().expect("credential lock") = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.credential.lock().expect("credential lock") = None;
        Ok(())
    }
}
