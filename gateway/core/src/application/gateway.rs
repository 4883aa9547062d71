// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gateway Application Service
//!
//! The surface a transport talks to: authenticate a connection once, receive
//! a [`SessionContext`], then dispatch every file request with it.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Binds authentication, sandbox roots and the FSAL together

use ssh_key::PublicKey;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::application::authentication::{AuthError, Authenticator};
use crate::domain::fsal::{FsalError, OperationOutcome, SandboxFsal};
use crate::domain::gateway_config::GatewayConfigManifest;
use crate::domain::handle::join_error;
use crate::domain::identity::IdentityRecord;
use crate::domain::operation::OperationRequest;
use crate::domain::repository::UserDirectory;
use crate::domain::sandbox::{provision_root, SandboxError, SandboxResolver};
use crate::domain::session::SessionContext;
use crate::infrastructure::directory::InMemoryUserDirectory;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Fsal(#[from] FsalError),
}

/// Gateway application service
#[derive(Debug, Clone)]
pub struct GatewayService {
    authenticator: Authenticator,
    fsal: Arc<SandboxFsal>,
}

impl GatewayService {
    pub fn new(authenticator: Authenticator, resolver: SandboxResolver) -> Self {
        Self {
            authenticator,
            fsal: Arc::new(SandboxFsal::new(resolver)),
        }
    }

    /// Build a service backed by the configured static user list.
    pub fn from_config(config: &GatewayConfigManifest) -> Result<Self, GatewayError> {
        let directory: Arc<dyn UserDirectory> =
            Arc::new(InMemoryUserDirectory::from_records(config.spec.users.iter().cloned()));
        let authenticator = Authenticator::new(directory, config.spec.password_scheme)
            .with_lookup_timeout(config.spec.lookup_timeout)
            .with_dummy_modeled_on(
                config
                    .spec
                    .users
                    .iter()
                    .filter_map(IdentityRecord::password_material),
            );
        let resolver = SandboxResolver::new(&config.spec.base_root)?;
        info!(
            base_root = %resolver.base_root().display(),
            users = config.spec.users.len(),
            scheme = %config.spec.password_scheme,
            "Gateway service initialized"
        );
        Ok(Self::new(authenticator, resolver))
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn fsal(&self) -> &SandboxFsal {
        &self.fsal
    }

    pub async fn login_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionContext, GatewayError> {
        let identity = self.authenticator.authenticate_password(username, password).await?;
        self.bind(identity).await
    }

    pub async fn login_public_key(
        &self,
        username: &str,
        key: &PublicKey,
    ) -> Result<SessionContext, GatewayError> {
        let identity = self.authenticator.authenticate_public_key(username, key).await?;
        self.bind(identity).await
    }

    /// Session for a named, enabled user without checking credentials.
    /// Intended for local operator tooling only.
    pub async fn operator_session(&self, username: &str) -> Result<SessionContext, GatewayError> {
        let identity = self.authenticator.lookup(username).await?;
        if identity.disabled {
            return Err(AuthError::AccountDisabled(username.to_string()).into());
        }
        self.bind(identity).await
    }

    pub async fn dispatch(
        &self,
        session: &SessionContext,
        request: OperationRequest,
    ) -> Result<OperationOutcome, FsalError> {
        self.fsal.dispatch(session, request).await
    }

    /// Fix the effective root for `identity` and make sure it exists.
    async fn bind(&self, identity: IdentityRecord) -> Result<SessionContext, GatewayError> {
        let root = self.fsal.resolver().session_root(&identity)?;
        let provision = root.clone();
        tokio::task::spawn_blocking(move || provision_root(&provision))
            .await
            .map_err(|e| FsalError::Io(join_error(e)))?;
        info!(
            username = %identity.username,
            root = %root.as_path().display(),
            permissions = %identity.permissions,
            "Session bound"
        );
        Ok(SessionContext::new(identity, root))
    }
}
