//! Persistence for the long-lived delegated credential.
//!
//! `auth.json` under the kubeassist home holds the credential obtained by
//! interactive login, written with 0600 permissions on Unix. A `GITHUB_TOKEN`
//! from the environment acts as a read-only fallback when nothing is stored.

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::AuthError;

pub const AUTH_FILE: &str = "auth.json";

const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(default = "schema_version")]
    pub version: u32,
    pub github_token: String,
    pub obtained_at: DateTime<Utc>,
}

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

impl StoredCredential {
    pub fn new(github_token: impl Into<String>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            github_token: github_token.into(),
            obtained_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("github_token", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredCredential>, AuthError>;

    fn save(&self, credential: &StoredCredential) -> Result<(), AuthError>;

    /// Discards the credential. Idempotent.
    fn clear(&self) -> Result<(), AuthError>;
}

pub struct FileCredentialStore {
    path: PathBuf,
    env_fallback: Option<String>,
    fallback_discarded: AtomicBool,
}

impl FileCredentialStore {
    pub fn new(home: &Path) -> Self {
        Self {
            path: home.join(AUTH_FILE),
            env_fallback: None,
            fallback_discarded: AtomicBool::new(false),
        }
    }

    pub fn with_env_fallback(mut self, token: Option<String>) -> Self {
        self.env_fallback = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredential>, AuthError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => return Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if self.fallback_discarded.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.env_fallback.as_ref().map(|token| StoredCredential {
            version: SCHEMA_VERSION,
            github_token: token.clone(),
            obtained_at: Utc::now(),
        }))
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path)?;
        file.write_all(serde_json::to_string_pretty(credential)?.as_bytes())?;
        file.flush()?;
        self.fallback_discarded.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        self.fallback_discarded.store(true, Ordering::SeqCst);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
