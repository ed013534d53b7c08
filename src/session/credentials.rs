//! Account credentials.

use md5::{Digest, Md5};

use super::CredentialsError;

/// Length of a hex-encoded MD5 digest.
const HASH_HEX_LEN: usize = 32;

/// A username plus the lowercase hex MD5 of its password.
///
/// The plaintext password is never stored. `Debug` output redacts the hash.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password_hash: String,
}

impl Credentials {
    /// Hashes a plaintext password.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::EmptyUsername`] if `username` is blank.
    pub fn from_password(
        username: impl Into<String>,
        password: &str,
    ) -> Result<Self, CredentialsError> {
        let username = checked_username(username.into())?;
        let password_hash = hex::encode(Md5::digest(password.as_bytes()));
        Ok(Self {
            username,
            password_hash,
        })
    }

    /// Accepts a precomputed password hash, normalizing it to lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::EmptyUsername`] for a blank username and
    /// [`CredentialsError::InvalidHash`] unless `hash` is 32 hex characters.
    pub fn from_hash(username: impl Into<String>, hash: &str) -> Result<Self, CredentialsError> {
        let username = checked_username(username.into())?;
        let hash = hash.trim();
        if hash.len() != HASH_HEX_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CredentialsError::invalid_hash(hash.len()));
        }
        Ok(Self {
            username,
            password_hash: hash.to_ascii_lowercase(),
        })
    }

    /// Returns the account name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the lowercase hex password hash.
    #[must_use]
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

fn checked_username(username: String) -> Result<String, CredentialsError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(CredentialsError::EmptyUsername);
    }
    Ok(trimmed.to_string())
}
