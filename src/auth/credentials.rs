//! Credentials file load/save and interactive setup
//!
//! The file is plain JSON: `{"username": "...", "token": "..."}`. Absence or
//! malformed content is a fatal startup error in download mode.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{AuthError, AuthResult};

/// Stored M2M credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// ERS username with M2M download access
    pub username: String,
    /// M2M application token
    pub token: String,
}

/// Credentials file status for the `auth status` command
#[derive(Debug, Clone)]
pub struct CredentialsStatus {
    /// Path that was checked
    pub path: PathBuf,
    /// Whether the file exists
    pub file_exists: bool,
    /// Username from the file, if it parsed
    pub username: Option<String>,
}

impl CredentialsStatus {
    /// Descriptive status message for display
    pub fn status_message(&self) -> String {
        match (&self.file_exists, &self.username) {
            (false, _) => format!(
                "No credentials file at {} - run 'auth setup' to create one",
                self.path.display()
            ),
            (true, Some(user)) => format!("Credentials configured for user '{}'", user),
            (true, None) => format!(
                "Credentials file at {} exists but is malformed",
                self.path.display()
            ),
        }
    }
}

/// Load credentials from the given file
pub fn load_credentials(path: &Path) -> AuthResult<Credentials> {
    if !path.exists() {
        return Err(AuthError::MissingCredentials {
            path: path.to_path_buf(),
        });
    }

    let contents = fs::read_to_string(path).map_err(|source| AuthError::CredentialStorage {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&contents).map_err(|source| AuthError::MalformedCredentials {
        path: path.to_path_buf(),
        source,
    })
}

/// Check credentials file status without failing
pub fn credentials_status(path: &Path) -> CredentialsStatus {
    let username = load_credentials(path).ok().map(|c| c.username);
    CredentialsStatus {
        path: path.to_path_buf(),
        file_exists: path.exists(),
        username,
    }
}

/// Prompt for credentials interactively. The token is read without echo.
pub fn prompt_credentials() -> AuthResult<Credentials> {
    print!("ERS Username: ");
    io::stdout().flush().map_err(AuthError::Prompt)?;

    let mut username = String::new();
    io::stdin()
        .read_line(&mut username)
        .map_err(AuthError::Prompt)?;
    let username = username.trim().to_string();

    if username.is_empty() {
        return Err(AuthError::Prompt(io::Error::new(
            io::ErrorKind::InvalidInput,
            "username cannot be empty",
        )));
    }

    let token = rpassword::prompt_password("M2M Token: ").map_err(AuthError::Prompt)?;

    if token.is_empty() {
        return Err(AuthError::Prompt(io::Error::new(
            io::ErrorKind::InvalidInput,
            "token cannot be empty",
        )));
    }

    Ok(Credentials { username, token })
}

/// Save credentials as JSON with owner-only permissions on Unix
pub fn save_credentials(path: &Path, credentials: &Credentials) -> AuthResult<()> {
    let contents = serde_json::to_string_pretty(credentials).expect("credentials serialize");

    fs::write(path, contents).map_err(|source| AuthError::CredentialStorage {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
            AuthError::CredentialStorage {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }

    Ok(())
}
