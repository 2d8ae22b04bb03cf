//! Credential management for M2M authentication
//!
//! Credentials (an ERS username plus an M2M application token) live in a
//! local JSON file. They are exchanged for a session token at login; this
//! module only handles storage and interactive setup.

mod credentials;

pub use credentials::{
    credentials_status, load_credentials, prompt_credentials, save_credentials, Credentials,
    CredentialsStatus,
};
