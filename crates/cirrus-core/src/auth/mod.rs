//! Authentication: credentials, refresh, and device-code login.

pub mod credential;
pub mod device;
pub mod transport;

pub use credential::{Credential, CredentialStore, FileCredentialStore};
pub use device::{DeviceCodeFlow, LoginProgress, PendingAuthState, PENDING_LOGIN_FILE};
pub use transport::AuthTransport;
