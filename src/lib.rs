// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT Gateway Auth - authentication and authorization for API gateways
//!
//! This crate decides, for a request carrying a JWT, whether the caller is
//! who they claim to be and which access policies apply to them, and keeps
//! the caller's session in step with those policies.
//!
//! ## Modules
//!
//! - `auth` - JWT decision engine and its Axum adapter
//! - `session` - Session state and the session store capability
//! - `policy` - Policies and the policy store capability
//! - `config` - Per-API security configuration and process settings
//! - `dispatch` - Boundary for externally hosted auth plugins
//! - `api` - HTTP routes of the gateway binary (Axum)

pub mod api;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod policy;
pub mod session;
pub mod state;
