//! Credential loading.
//!
//! Credentials live in a JSON file outside the repo, in either of two shapes
//! that are both found in the wild: a two-element array
//! `["user@example.com", "secret"]` or an object
//! `{"username": "...", "password": "..."}`.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use alphaforge_core::session::Credentials;

#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialsFile {
    Pair(String, String),
    Named { username: String, password: String },
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("failed to read credentials file: {0}")]
    Io(#[from] std::io::Error),

    #[error("credentials file is neither a [user, pass] array nor a username/password object")]
    Shape,

    #[error("credentials file has an empty username or password")]
    Empty,
}

/// Load credentials from `path`, accepting both supported shapes.
pub fn load_credentials(path: &Path) -> Result<Credentials, CredentialsError> {
    parse_credentials(&std::fs::read_to_string(path)?)
}

fn parse_credentials(raw: &str) -> Result<Credentials, CredentialsError> {
    let file: CredentialsFile = serde_json::from_str(raw).map_err(|_| CredentialsError::Shape)?;
    let (username, password) = match file {
        CredentialsFile::Pair(username, password) => (username, password),
        CredentialsFile::Named { username, password } => (username, password),
    };
    if username.is_empty() || password.is_empty() {
        return Err(CredentialsError::Empty);
    }
    Ok(Credentials::new(username, password))
}
