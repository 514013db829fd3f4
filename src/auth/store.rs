//! Credential store backed by a JSON document
//!
//! Layout: `{"users": {"<username>": "<hash>"}}`. Every registration rewrites
//! the whole document; there is no append path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::password::{hash_password, validate_password_strength, verify_password, PasswordScheme};
use crate::error::{PredictorError, Result};
use crate::session::Session;

/// On-disk credential document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFile {
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

pub struct CredentialStore {
    path: PathBuf,
    scheme: PasswordScheme,
    /// Serialises read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new<P: AsRef<Path>>(path: P, scheme: PasswordScheme) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            scheme,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the credential document; a missing or empty file is an empty map
    pub async fn load(&self) -> Result<UserFile> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Credential file absent");
                return Ok(UserFile::default());
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(UserFile::default());
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, users: &UserFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        users.serialize(&mut ser)?;

        fs::write(&self.path, buf).await?;
        Ok(())
    }

    /// Register a new user
    ///
    /// The document is only rewritten when every check passes, so a rejected
    /// attempt leaves the file byte-for-byte unchanged.
    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        validate_password_strength(password)?;

        let _guard = self.write_lock.lock().await;
        let mut users = self.load().await?;

        if users.users.contains_key(username) {
            warn!(username = %username, "Registration rejected - username exists");
            return Err(PredictorError::DuplicateUser(username.to_string()));
        }

        let hash = hash_password(password, self.scheme)?;
        users.users.insert(username.to_string(), hash);
        self.save(&users).await?;

        info!(username = %username, scheme = ?self.scheme, "Registered user");
        Ok(())
    }

    /// Check credentials and open a session bound to `username`
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Session> {
        let users = self.load().await?;

        let stored = users
            .users
            .get(username)
            .ok_or_else(|| PredictorError::UnknownUser(username.to_string()))?;

        if !verify_password(password, stored)? {
            warn!(username = %username, "Login failed - invalid password");
            return Err(PredictorError::BadCredentials);
        }

        info!(username = %username, "Login successful");
        Ok(Session::new(username))
    }

    pub async fn user_count(&self) -> Result<usize> {
        Ok(self.load().await?.users.len())
    }
}
