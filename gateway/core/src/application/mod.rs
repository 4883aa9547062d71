// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod authentication;
pub mod gateway;

pub use authentication::{AuthError, Authenticator, RejectReason};
pub use gateway::{GatewayError, GatewayService};
