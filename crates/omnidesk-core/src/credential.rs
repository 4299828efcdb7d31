//! Password hashing, verification and policy validation.
//!
//! Hashing uses Argon2id with a per-call random salt; verification runs in
//! constant time with respect to where a mismatch occurs. Strength
//! validation evaluates every policy check independently and reports all
//! violations at once. No shared state anywhere in this module.

use argon2::password_hash::{Error as ArgonError, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::TRACING_TARGET_CREDENTIAL;
use crate::config::PasswordPolicy;

/// Hash algorithm version stamped into every [`Credential`].
///
/// Bump when the hashing parameters change so existing hashes can be
/// migrated on next successful login.
const HASH_VERSION: u8 = 1;

/// Passwords rejected outright regardless of the configured policy.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "123456", "password123", "admin", "qwerty", "letmein", "welcome", "monkey",
    "dragon",
];

/// Special characters counted as their own character class.
const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// A stored credential: the PHC-format hash plus the algorithm version it
/// was produced with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// PHC string containing algorithm, parameters, salt and hash.
    pub password_hash: String,
    /// Version of the hashing scheme used.
    pub hash_version: u8,
}

/// Failure while configuring or running the hashing primitive.
/// Infrastructure, not an authentication outcome; callers map it to an
/// internal error.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Salt generation or the hashing primitive itself failed.
    #[error("credential hashing failed")]
    Hash(#[source] ArgonError),
    /// The requested work factor is outside the algorithm's bounds.
    #[error("invalid hashing parameters")]
    Params(#[source] argon2::Error),
}

/// One failed policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum PolicyViolation {
    /// Shorter than the configured minimum.
    #[error("password must be at least {min_length} characters long")]
    TooShort {
        /// Configured minimum length.
        min_length: usize,
    },
    /// No uppercase letter present.
    #[error("password must contain at least one uppercase letter")]
    MissingUppercase,
    /// No lowercase letter present.
    #[error("password must contain at least one lowercase letter")]
    MissingLowercase,
    /// No decimal digit present.
    #[error("password must contain at least one digit")]
    MissingDigit,
    /// No special character present.
    #[error("password must contain at least one special character")]
    MissingSpecial,
    /// Appears on the common-password denylist.
    #[error("password is too common")]
    CommonPassword,
}

/// Outcome of strength validation: overall verdict, every violation found,
/// and a score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrengthReport {
    /// True iff every policy check passed.
    pub valid: bool,
    /// All violations, not just the first.
    pub violations: Vec<PolicyViolation>,
    /// Weighted score: length up to 0.25 (saturating at 20 chars),
    /// character classes 0.15 each up to 0.6, unique-character ratio up
    /// to 0.2; clamped to 1.0.
    pub score: f64,
}

/// Password hashing and policy validation service.
#[derive(Clone)]
pub struct CredentialManager {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager").finish_non_exhaustive()
    }
}

impl CredentialManager {
    /// Creates a manager with the default Argon2id parameters.
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Creates a manager with a custom work factor.
    ///
    /// # Arguments
    ///
    /// * `memory_kib` - Memory cost in KiB
    /// * `iterations` - Number of passes over memory
    pub fn with_work_factor(memory_kib: u32, iterations: u32) -> Result<Self, CredentialError> {
        let params =
            argon2::Params::new(memory_kib, iterations, 1, None).map_err(CredentialError::Params)?;
        Ok(Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params),
        })
    }

    /// Hashes a password with a fresh cryptographically secure salt.
    ///
    /// # Errors
    ///
    /// Fails only when salt generation or the hashing primitive itself
    /// fails; never because of password content.
    pub fn hash(&self, password: &str) -> Result<Credential, CredentialError> {
        let salt = SaltString::try_from_rng(&mut OsRng).map_err(|source| {
            tracing::error!(
                target: TRACING_TARGET_CREDENTIAL,
                error = %source,
                "failed to generate salt"
            );
            CredentialError::Hash(source)
        })?;

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|source| {
                tracing::error!(
                    target: TRACING_TARGET_CREDENTIAL,
                    error = %source,
                    "password hashing failed"
                );
                CredentialError::Hash(source)
            })?;

        Ok(Credential {
            password_hash: password_hash.to_string(),
            hash_version: HASH_VERSION,
        })
    }

    /// Verifies a password against a stored credential.
    ///
    /// Argon2's verifier compares in constant time; a malformed stored
    /// hash is logged and treated as a mismatch rather than an error, so
    /// the caller sees a uniform boolean.
    #[must_use]
    pub fn verify(&self, password: &str, credential: &Credential) -> bool {
        let parsed = match PasswordHash::new(&credential.password_hash) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_CREDENTIAL,
                    error = %error,
                    hash_version = credential.hash_version,
                    "stored credential hash is malformed"
                );
                return false;
            }
        };

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => true,
            Err(ArgonError::Password) => false,
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_CREDENTIAL,
                    error = %error,
                    "password verification system error"
                );
                false
            }
        }
    }

    /// Performs a throwaway verification to equalize timing when no
    /// account (and therefore no stored hash) exists.
    ///
    /// Always returns false after doing real cryptographic work.
    pub fn verify_dummy(&self, password: &str) -> bool {
        use rand::Rng;

        let dummy: String = (0..24)
            .map(|_| rand::rng().sample(rand::distr::Alphanumeric) as char)
            .collect();

        if let Ok(credential) = self.hash(&dummy) {
            let _ = self.verify(password, &credential);
        }
        false
    }

    /// Validates a password against the policy and scores its strength.
    ///
    /// Every check is evaluated; `valid` is true iff no violation was
    /// recorded.
    #[must_use]
    pub fn validate_strength(&self, password: &str, policy: &PasswordPolicy) -> StrengthReport {
        let mut violations = Vec::new();

        if password.chars().count() < policy.min_length {
            violations.push(PolicyViolation::TooShort {
                min_length: policy.min_length,
            });
        }
        if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            violations.push(PolicyViolation::MissingUppercase);
        }
        if policy.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            violations.push(PolicyViolation::MissingLowercase);
        }
        if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push(PolicyViolation::MissingDigit);
        }
        if policy.require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
            violations.push(PolicyViolation::MissingSpecial);
        }
        if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
            violations.push(PolicyViolation::CommonPassword);
        }

        StrengthReport {
            valid: violations.is_empty(),
            violations,
            score: Self::strength_score(password),
        }
    }

    fn strength_score(password: &str) -> f64 {
        let len = password.chars().count();
        if len == 0 {
            return 0.0;
        }

        let length_score = (len as f64 / 20.0).min(1.0) * 0.25;

        let classes = [
            password.chars().any(|c| c.is_ascii_lowercase()),
            password.chars().any(|c| c.is_ascii_uppercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| SPECIAL_CHARS.contains(c)),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        let class_score = classes as f64 * 0.15;

        let unique: std::collections::HashSet<char> = password.chars().collect();
        let entropy_score = (unique.len() as f64 / len as f64).min(1.0) * 0.2;

        (length_score + class_score + entropy_score).min(1.0)
    }
}

impl Default for CredentialManager {
    fn default() -> Self {
        Self::new()
    }
}
