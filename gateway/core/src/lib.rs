// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sandgate Core
//!
//! Access control for a multi-tenant file-transfer gateway: every principal is
//! confined to a private subtree of a shared filesystem and limited to the
//! operations its permission mask grants.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Sandbox resolution, permission gating, operation dispatch
//!   and authentication decisions. Transports and user storage plug in at
//!   the edges.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
