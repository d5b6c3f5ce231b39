//! Password hashing through the host's system crypt library.
//!
//! Hashes use the library's preferred method and come out in the usual
//! self-describing format (`$y$...`, `$6$...`), so that verification only
//! needs the stored string. All operations are safe to call from several
//! threads at once.

use std::ffi::CString;

use tracing::debug;

mod lowlevel;

use lowlevel::LowLevel;

#[derive(Debug, thiserror::Error)]
pub enum CryptError {
    #[error("cannot load the system crypt library: {0}")]
    LibraryUnavailable(String),
    #[error("libcrypt does not support {0}")]
    MissingCapability(&'static str),
    #[error("{operation} failed: {reason}")]
    Failed {
        operation: &'static str,
        reason: String,
    },
    #[error("invalid result from libcrypt: {0:?}")]
    InvalidResult(String),
    #[error("input for libcrypt must not contain NUL bytes")]
    InvalidInput,
}

/// Hashing seam used by everything that stores passwords.
pub trait PasswordHasher: Send + Sync {
    /// Hashes a password with a fresh salt.
    ///
    /// # Errors
    /// Returns an error if the underlying library fails to hash.
    fn hash_password(&self, password: &str) -> Result<String, CryptError>;

    /// Returns whether `password` matches `password_hash`.
    fn check_password_hash(&self, password: &str, password_hash: &str) -> bool;

    /// Returns whether `password_hash` should be replaced by a fresh hash.
    fn is_weak_hash(&self, password_hash: &str) -> bool;
}

/// [`PasswordHasher`] backed by libcrypt.
#[derive(Debug)]
pub struct SystemHasher {
    lowlevel: LowLevel,
    preferred_method: String,
}

impl SystemHasher {
    /// Loads libcrypt and checks that it can generate salts with the default
    /// prefix and with automatic entropy.
    ///
    /// # Errors
    /// Returns an error naming the missing capability if the library is
    /// unusable.
    pub fn new() -> Result<Self, CryptError> {
        let lowlevel = LowLevel::load()?;
        lowlevel.feature_test()?;
        let preferred_method = lowlevel.preferred_method()?;
        debug!("libcrypt preferred hashing method is {preferred_method}");
        Ok(Self {
            lowlevel,
            preferred_method,
        })
    }

    /// The prefix of the method used by [`SystemHasher::hash`], e.g. `$y$`.
    #[must_use]
    pub fn preferred_method(&self) -> &str {
        &self.preferred_method
    }

    /// Hashes `plaintext` with the preferred method and a fresh salt.
    ///
    /// # Errors
    /// Returns an error if the input contains NUL bytes or libcrypt fails.
    pub fn hash(&self, plaintext: &str) -> Result<String, CryptError> {
        self.hash_with_prefix(plaintext, "")
    }

    /// Hashes `plaintext` with the method selected by `prefix`; an empty
    /// prefix selects the preferred method.
    ///
    /// # Errors
    /// Returns an error if the input contains NUL bytes, the prefix is not
    /// supported, or libcrypt fails.
    pub fn hash_with_prefix(&self, plaintext: &str, prefix: &str) -> Result<String, CryptError> {
        let prefix = if prefix.is_empty() {
            None
        } else {
            Some(CString::new(prefix).map_err(|_| CryptError::InvalidInput)?)
        };
        let setting = self.lowlevel.gensalt(prefix.as_deref(), None)?;
        let result = self.crypt(plaintext, &setting)?;
        if result.is_empty() || result.starts_with('*') {
            return Err(CryptError::InvalidResult(result));
        }
        Ok(result)
    }

    /// Returns whether rehashing `plaintext` with `stored` as the setting
    /// reproduces `stored` exactly.
    #[must_use]
    pub fn verify(&self, plaintext: &str, stored: &str) -> bool {
        match self.crypt(plaintext, stored) {
            Ok(result) => result.as_bytes() == stored.as_bytes(),
            Err(_) => false,
        }
    }

    /// Returns whether `stored` was produced by a method other than the
    /// preferred one.
    #[must_use]
    pub fn is_weak_hash(&self, stored: &str) -> bool {
        !stored.starts_with(&self.preferred_method)
    }

    fn crypt(&self, phrase: &str, setting: &str) -> Result<String, CryptError> {
        let phrase = CString::new(phrase).map_err(|_| CryptError::InvalidInput)?;
        let setting = CString::new(setting).map_err(|_| CryptError::InvalidInput)?;
        self.lowlevel.crypt(&phrase, &setting)
    }
}

impl PasswordHasher for SystemHasher {
    fn hash_password(&self, password: &str) -> Result<String, CryptError> {
        self.hash(password)
    }

    fn check_password_hash(&self, password: &str, password_hash: &str) -> bool {
        self.verify(password, password_hash)
    }

    fn is_weak_hash(&self, password_hash: &str) -> bool {
        SystemHasher::is_weak_hash(self, password_hash)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn hasher() -> SystemHasher {
        SystemHasher::new().expect("libcrypt with gensalt support")
    }

    #[test]
    fn test_hash_uses_preferred_method() {
        let hasher = hasher();
        let hash = hasher.hash("hunter2").unwrap();
        assert!(hash.starts_with(hasher.preferred_method()));
        assert!(hash.starts_with('$'));
        assert!(!hasher.is_weak_hash(&hash));
    }

    #[test]
    fn test_verify_round_trip() {
        let hasher = hasher();
        let hash = hasher.hash("hunter2").unwrap();
        assert!(hasher.verify("hunter2", &hash));
        assert!(!hasher.verify("Hunter2", &hash));
        assert!(!hasher.verify("", &hash));
    }

    #[test]
    fn test_verify_requires_exact_match() {
        let hasher = hasher();
        let hash = hasher.hash("hunter2").unwrap();
        assert!(!hasher.verify("hunter2", &format!("{hash}x")));
        assert!(!hasher.verify("hunter2", &hash[..hash.len() - 1]));
    }

    #[test]
    fn test_fresh_salt_per_hash() {
        let hasher = hasher();
        let first = hasher.hash("hunter2").unwrap();
        let second = hasher.hash("hunter2").unwrap();
        assert_ne!(first, second);
        assert!(hasher.verify("hunter2", &first));
        assert!(hasher.verify("hunter2", &second));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let hasher = hasher();
        assert!(!hasher.verify("hunter2", ""));
        assert!(!hasher.verify("hunter2", "*0"));
        assert!(!hasher.verify("hunter2", "{PLAINTEXT}hunter2"));
    }

    #[test]
    fn test_nul_bytes_are_rejected() {
        let hasher = hasher();
        assert!(matches!(
            hasher.hash("hun\0ter2"),
            Err(CryptError::InvalidInput)
        ));
        assert!(!hasher.verify("hun\0ter2", "$6$salt$digest"));
    }

    #[test]
    fn test_hash_with_explicit_prefix() {
        let hasher = hasher();
        let hash = hasher.hash_with_prefix("hunter2", "$6$").unwrap();
        assert!(hash.starts_with("$6$"));
        assert!(hasher.verify("hunter2", &hash));
        assert_eq!(hasher.is_weak_hash(&hash), hasher.preferred_method() != "$6$");
    }

    #[test]
    fn test_unknown_prefix_fails() {
        let hasher = hasher();
        assert!(hasher.hash_with_prefix("hunter2", "$nope$").is_err());
    }

    #[test]
    fn test_concurrent_hashing() {
        let hasher = Arc::new(hasher());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let hasher = Arc::clone(&hasher);
                std::thread::spawn(move || {
                    let password = format!("password-{i}");
                    let hash = hasher.hash(&password).unwrap();
                    assert!(hasher.verify(&password, &hash));
                    assert!(!hasher.verify("other", &hash));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_trait_object() {
        let hasher: Box<dyn PasswordHasher> = Box::new(hasher());
        let hash = hasher.hash_password("correct horse").unwrap();
        assert!(hasher.check_password_hash("correct horse", &hash));
        assert!(!hasher.check_password_hash("battery staple", &hash));
        assert!(!hasher.is_weak_hash(&hash));
    }
}
