use crate::error_handling::types::AuthError;
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Source of truth for `username -> secret` pairs.
///
/// `validate` returns `Err` only for a fault inside the backend, never for a wrong password.
pub trait CredentialStore: Send + Sync {
    fn validate(&self, username: &str, secret: &str) -> Result<bool, AuthError>;
}

/// Checks a login attempt. Blank usernames or secrets are refused without consulting `store`.
pub fn authenticate(
    store: &dyn CredentialStore,
    username: &str,
    secret: &str,
) -> Result<bool, AuthError> {
    if username.trim().is_empty() || secret.trim().is_empty() {
        debug!("Blank credentials refused");
        return Ok(false);
    }
    store.validate(username, secret)
}

/// Credentials loaded once from a flat file and never modified afterwards.
///
/// File format, one record per line:
///
/// ```text
/// # comments start with '#'
/// admin:admin
/// guest:guest123
/// ```
#[derive(Debug, Default, Clone)]
pub struct FileCredentialStore {
    users: HashMap<String, String>,
}

impl FileCredentialStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads and parses `path`. A missing file, a line without `:`, an empty field, or a
    /// duplicate username aborts the whole load.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content =
            fs::read_to_string(path).map_err(|e| AuthError::Unreadable(path.to_path_buf(), e))?;
        let store = Self::parse(&content)?;
        info!("Loaded {} user(s) from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn parse(content: &str) -> Result<Self, AuthError> {
        let mut users = HashMap::new();

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (username, secret) = line.split_once(':').ok_or_else(|| AuthError::InvalidLine {
                line: line_no,
                reason: "missing ':' separator".to_string(),
            })?;
            let (username, secret) = (username.trim(), secret.trim());
            if username.is_empty() || secret.is_empty() {
                return Err(AuthError::InvalidLine {
                    line: line_no,
                    reason: "username and secret must not be empty".to_string(),
                });
            }
            if users.contains_key(username) {
                return Err(AuthError::DuplicateUser {
                    line: line_no,
                    username: username.to_string(),
                });
            }
            users.insert(username.to_string(), secret.to_string());
        }

        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialStore for FileCredentialStore {
    fn validate(&self, username: &str, secret: &str) -> Result<bool, AuthError> {
        Ok(self
            .users
            .get(username)
            .is_some_and(|stored| stored.as_str() == secret))
    }
}
