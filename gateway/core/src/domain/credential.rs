// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Password hashing schemes.
//!
//! Stored hashes are produced by [`PasswordScheme::hash`] (or by whatever
//! tool populated the directory) and checked with the scheme's own verifier.
//! Neither scheme compares strings directly.

use scrypt::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use scrypt::Scrypt;
use serde::{Deserialize, Serialize};
use ssh_key::authorized_keys::Entry;
use ssh_key::PublicKey;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("scrypt error: {0}")]
    Scrypt(String),

    #[error("unknown password scheme: {0}")]
    UnknownScheme(String),

    #[error("no {0} cost parameters in template hash")]
    UnusableTemplate(&'static str),
}

impl From<scrypt::password_hash::Error> for CredentialError {
    fn from(err: scrypt::password_hash::Error) -> Self {
        CredentialError::Scrypt(err.to_string())
    }
}

/// Parse one authorized-keys line (options and comment allowed) into the
/// public key it carries.
pub fn parse_authorized_key(line: &str) -> Result<PublicKey, ssh_key::Error> {
    Ok(Entry::from_str(line.trim())?.public_key().clone())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    #[default]
    Bcrypt,
    /// PHC-formatted scrypt strings (`$scrypt$ln=...`).
    Scrypt,
}

impl PasswordScheme {
    /// `Ok(false)` on mismatch. Errors mean the stored hash is unusable.
    pub fn verify(self, password: &str, stored_hash: &str) -> Result<bool, CredentialError> {
        match self {
            PasswordScheme::Bcrypt => Ok(bcrypt::verify(password, stored_hash)?),
            PasswordScheme::Scrypt => {
                let parsed = PasswordHash::new(stored_hash)?;
                match Scrypt.verify_password(password.as_bytes(), &parsed) {
                    Ok(()) => Ok(true),
                    Err(scrypt::password_hash::Error::Password) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    pub fn hash(self, password: &str) -> Result<String, CredentialError> {
        match self {
            PasswordScheme::Bcrypt => Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?),
            PasswordScheme::Scrypt => {
                let salt = SaltString::generate(&mut rand_core::OsRng);
                Ok(Scrypt.hash_password(password.as_bytes(), &salt)?.to_string())
            }
        }
    }

    /// Hash `password` with the cost parameters carried by `template`, an
    /// existing hash of this scheme.
    pub fn hash_like(self, password: &str, template: &str) -> Result<String, CredentialError> {
        match self {
            PasswordScheme::Bcrypt => {
                let cost = bcrypt_cost(template)
                    .ok_or_else(|| CredentialError::UnusableTemplate(self.name()))?;
                Ok(bcrypt::hash(password, cost)?)
            }
            PasswordScheme::Scrypt => {
                let parsed = PasswordHash::new(template)?;
                let params = scrypt::Params::try_from(&parsed)?;
                let salt = SaltString::generate(&mut rand_core::OsRng);
                Ok(Scrypt
                    .hash_password_customized(password.as_bytes(), None, None, params, &salt)?
                    .to_string())
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PasswordScheme::Bcrypt => "bcrypt",
            PasswordScheme::Scrypt => "scrypt",
        }
    }
}

/// Cost field of a modular-crypt bcrypt string (`$2b$10$...`).
fn bcrypt_cost(hash: &str) -> Option<u32> {
    let mut fields = hash.split('$');
    if !fields.next()?.is_empty() {
        return None;
    }
    let version = fields.next()?;
    if !matches!(version, "2a" | "2b" | "2x" | "2y") {
        return None;
    }
    let cost: u32 = fields.next()?.parse().ok()?;
    (4..=31).contains(&cost).then_some(cost)
}

impl fmt::Display for PasswordScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PasswordScheme {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bcrypt" => Ok(PasswordScheme::Bcrypt),
            "scrypt" => Ok(PasswordScheme::Scrypt),
            other => Err(CredentialError::UnknownScheme(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcrypt_roundtrip_and_mismatch() {
        let hash = bcrypt::hash("hunter2", 4).unwrap();
        assert!(PasswordScheme::Bcrypt.verify("hunter2", &hash).unwrap());
        assert!(!PasswordScheme::Bcrypt.verify("hunter3", &hash).unwrap());
    }

    fn cheap_scrypt(password: &str) -> String {
        let salt = SaltString::generate(&mut rand_core::OsRng);
        let params = scrypt::Params::new(4, 8, 1, 32).unwrap();
        Scrypt
            .hash_password_customized(password.as_bytes(), None, None, params, &salt)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_scrypt_phc_string() {
        let hash = cheap_scrypt("correct horse");
        assert!(hash.starts_with("$scrypt$"));
        assert!(PasswordScheme::Scrypt.verify("correct horse", &hash).unwrap());
        assert!(!PasswordScheme::Scrypt.verify("battery staple", &hash).unwrap());
    }

    #[test]
    fn test_hash_like_keeps_bcrypt_cost() {
        let stored = bcrypt::hash("anything", 5).unwrap();
        let dummy = PasswordScheme::Bcrypt.hash_like("other", &stored).unwrap();
        assert_eq!(&dummy[..7], &stored[..7]);
        assert_eq!(bcrypt_cost(&dummy), Some(5));
        assert!(PasswordScheme::Bcrypt.verify("other", &dummy).unwrap());

        assert!(PasswordScheme::Bcrypt.hash_like("x", "not-a-hash").is_err());
        assert_eq!(bcrypt_cost("$2b$99$abc"), None);
        assert_eq!(bcrypt_cost("$2y$10$abc"), Some(10));
    }

    #[test]
    fn test_hash_like_keeps_scrypt_params() {
        let stored = cheap_scrypt("anything");
        let dummy = PasswordScheme::Scrypt.hash_like("other", &stored).unwrap();
        let stored_params = scrypt::Params::try_from(&PasswordHash::new(&stored).unwrap()).unwrap();
        let dummy_params = scrypt::Params::try_from(&PasswordHash::new(&dummy).unwrap()).unwrap();
        assert_eq!(stored_params.log_n(), dummy_params.log_n());
        assert_eq!(stored_params.r(), dummy_params.r());
        assert!(PasswordScheme::Scrypt.verify("other", &dummy).unwrap());
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(PasswordScheme::Bcrypt.verify("x", "not-a-hash").is_err());
        assert!(PasswordScheme::Scrypt.verify("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_parse_authorized_key_ignores_options_and_comment() {
        use ssh_key::public::{Ed25519PublicKey, KeyData};

        let key = PublicKey::new(KeyData::Ed25519(Ed25519PublicKey([7u8; 32])), "alice@laptop");
        let line = key.to_openssh().unwrap();
        let with_options = format!("no-pty,from=\"10.0.0.0/8\" {line}");

        let parsed = parse_authorized_key(&with_options).unwrap();
        assert_eq!(parsed.key_data(), key.key_data());
        assert!(parse_authorized_key("ssh-ed25519 not-base64!").is_err());
    }

    #[test]
    fn test_parse_scheme() {
        assert_eq!("BCRYPT".parse::<PasswordScheme>().unwrap(), PasswordScheme::Bcrypt);
        assert_eq!("scrypt".parse::<PasswordScheme>().unwrap(), PasswordScheme::Scrypt);
        assert!("argon2".parse::<PasswordScheme>().is_err());
    }
}
