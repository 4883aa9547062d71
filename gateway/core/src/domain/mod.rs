// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure gateway types and the filesystem boundary.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Permissions, identities, sandbox resolution and dispatch

pub mod permission;
pub mod identity;
pub mod credential;
pub mod session;
pub mod repository;
pub mod sandbox;
pub mod storage;
pub mod listing;
pub mod operation;
pub mod handle;
pub mod fsal;
pub mod gateway_config;
