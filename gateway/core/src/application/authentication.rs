// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Authentication Application Service
//!
//! Password and public-key decisions against the user directory.
//!
//! - Every directory lookup is bounded by the configured timeout. Expiry and
//!   directory errors are rejections, never retries.
//! - Password rejections for unknown, disabled or password-less accounts still
//!   run one verification against a throwaway hash, so every password
//!   rejection costs about the same.
//! - Public keys are compared on their canonical wire encoding in constant
//!   time. Comments and options in the stored line play no part.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Establishes the identity bound to a session

use ssh_key::PublicKey;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::credential::{parse_authorized_key, PasswordScheme};
use crate::domain::identity::IdentityRecord;
use crate::domain::repository::UserDirectory;

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

const DUMMY_PASSWORD: &str = "sandgate-timing-equalizer";

/// Internal cause of a failed authentication. Logged, never sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownUser,
    NoPasswordSet,
    PasswordMismatch,
    NoPublicKeySet,
    InvalidStoredKey,
    PublicKeyMismatch,
    DirectoryUnavailable,
    LookupTimedOut,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::UnknownUser => "unknown user",
            RejectReason::NoPasswordSet => "no password set",
            RejectReason::PasswordMismatch => "password mismatch",
            RejectReason::NoPublicKeySet => "no public key set",
            RejectReason::InvalidStoredKey => "stored public key is invalid",
            RejectReason::PublicKeyMismatch => "public key mismatch",
            RejectReason::DirectoryUnavailable => "user directory unavailable",
            RejectReason::LookupTimedOut => "user lookup timed out",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication failed for {username}: {reason}")]
    AuthenticationFailed { username: String, reason: RejectReason },

    #[error("Account disabled: {0}")]
    AccountDisabled(String),
}

impl AuthError {
    fn failed(username: &str, reason: RejectReason) -> Self {
        AuthError::AuthenticationFailed {
            username: username.to_string(),
            reason,
        }
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            AuthError::AuthenticationFailed { reason, .. } => Some(*reason),
            AuthError::AccountDisabled(_) => None,
        }
    }
}

/// Authentication decision service.
#[derive(Clone)]
pub struct Authenticator {
    directory: Arc<dyn UserDirectory>,
    scheme: PasswordScheme,
    lookup_timeout: Duration,
    dummy_hash: Arc<OnceLock<Option<String>>>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("scheme", &self.scheme)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(directory: Arc<dyn UserDirectory>, scheme: PasswordScheme) -> Self {
        Self {
            directory,
            scheme,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Use `hash` as the throwaway hash instead of deriving one on first use.
    /// It should carry the same cost parameters as real stored hashes.
    pub fn with_dummy_hash(self, hash: impl Into<String>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Some(hash.into()));
        Self {
            dummy_hash: Arc::new(cell),
            ..self
        }
    }

    /// Derive the throwaway hash now, with the cost parameters of the first
    /// usable hash in `stored`. Falls back to the scheme's default cost when
    /// none of them can serve as a template.
    pub fn with_dummy_modeled_on<'a>(self, stored: impl IntoIterator<Item = &'a str>) -> Self {
        let scheme = self.scheme;
        let dummy = stored
            .into_iter()
            .find_map(|template| scheme.hash_like(DUMMY_PASSWORD, template).ok())
            .or_else(|| {
                debug!(scheme = %scheme, "No stored hash to model the timing equalizer on");
                scheme.hash(DUMMY_PASSWORD).ok()
            });
        if dummy.is_none() {
            warn!(scheme = %scheme, "Timing equalizer hash could not be derived");
        }
        let cell = OnceLock::new();
        let _ = cell.set(dummy);
        Self {
            dummy_hash: Arc::new(cell),
            ..self
        }
    }

    #[cfg(test)]
    pub(crate) fn dummy_hash(&self) -> Option<&str> {
        self.dummy_hash.get().and_then(|d| d.as_deref())
    }

    pub fn scheme(&self) -> PasswordScheme {
        self.scheme
    }

    pub fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }

    pub async fn authenticate_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IdentityRecord, AuthError> {
        let record = match self.lookup(username).await {
            Ok(record) => record,
            Err(e) => {
                self.equalize(password).await;
                return Err(e);
            }
        };

        if record.disabled {
            self.equalize(password).await;
            warn!(username, "Password authentication rejected: account disabled");
            return Err(AuthError::AccountDisabled(username.to_string()));
        }

        let Some(hash) = record.password_material().map(str::to_string) else {
            self.equalize(password).await;
            warn!(username, "Password authentication rejected: no password set");
            return Err(AuthError::failed(username, RejectReason::NoPasswordSet));
        };

        if self.verify(password, hash).await {
            info!(username, method = "password", "User authenticated");
            Ok(record)
        } else {
            warn!(username, "Password authentication rejected: mismatch");
            Err(AuthError::failed(username, RejectReason::PasswordMismatch))
        }
    }

    pub async fn authenticate_public_key(
        &self,
        username: &str,
        presented: &PublicKey,
    ) -> Result<IdentityRecord, AuthError> {
        let record = self.lookup(username).await?;

        if record.disabled {
            warn!(username, "Public key authentication rejected: account disabled");
            return Err(AuthError::AccountDisabled(username.to_string()));
        }

        let Some(line) = record.public_key_material() else {
            warn!(username, "Public key authentication rejected: no public key set");
            return Err(AuthError::failed(username, RejectReason::NoPublicKeySet));
        };

        let stored = match parse_authorized_key(line).and_then(|k| k.to_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(username, error = %e, "Public key authentication rejected: stored key unparseable");
                return Err(AuthError::failed(username, RejectReason::InvalidStoredKey));
            }
        };
        let offered = match presented.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(username, error = %e, "Public key authentication rejected: offered key unencodable");
                return Err(AuthError::failed(username, RejectReason::PublicKeyMismatch));
            }
        };

        if bool::from(stored.as_slice().ct_eq(offered.as_slice())) {
            info!(username, method = "publickey", "User authenticated");
            Ok(record)
        } else {
            warn!(username, "Public key authentication rejected: mismatch");
            Err(AuthError::failed(username, RejectReason::PublicKeyMismatch))
        }
    }

    /// Bounded lookup of an existing record. Directory errors and timeouts
    /// are reported as authentication failures.
    pub async fn lookup(&self, username: &str) -> Result<IdentityRecord, AuthError> {
        let lookup = self.directory.find_by_username(username);
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Err(_) => {
                warn!(username, timeout = ?self.lookup_timeout, "User lookup timed out");
                Err(AuthError::failed(username, RejectReason::LookupTimedOut))
            }
            Ok(Err(e)) => {
                warn!(username, error = %e, "User lookup failed");
                Err(AuthError::failed(username, RejectReason::DirectoryUnavailable))
            }
            Ok(Ok(None)) => {
                warn!(username, "Authentication rejected: user not found");
                Err(AuthError::failed(username, RejectReason::UnknownUser))
            }
            Ok(Ok(Some(record))) => {
                debug!(username, "User record found");
                Ok(record)
            }
        }
    }

    async fn verify(&self, password: &str, hash: String) -> bool {
        let scheme = self.scheme;
        let password = password.to_string();
        let result = tokio::task::spawn_blocking(move || scheme.verify(&password, &hash)).await;
        match result {
            Ok(Ok(matched)) => matched,
            Ok(Err(e)) => {
                warn!(error = %e, scheme = %scheme, "Stored password hash could not be verified");
                false
            }
            Err(e) => {
                warn!(error = %e, "Password verification task failed");
                false
            }
        }
    }

    async fn equalize(&self, password: &str) {
        let scheme = self.scheme;
        let cell = Arc::clone(&self.dummy_hash);
        let password = password.to_string();
        let _ = tokio::task::spawn_blocking(move || {
            let dummy = cell.get_or_init(|| scheme.hash(DUMMY_PASSWORD).ok());
            if let Some(hash) = dummy {
                let _ = scheme.verify(&password, hash);
            }
        })
        .await;
    }
}
