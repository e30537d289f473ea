// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Security primitives shared by every in-memory store.
//!
//! ## Key requirement
//!
//! Every store in this crate (users, api keys, tenants, OIDC caches, CSRF
//! state) guards its indices with exactly one reader/writer lock. None of
//! them may panic on a poisoned lock — see [`locks`].
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::RwLock;
//! use graphdb_trust::security::{resilient_read, resilient_write};
//!
//! let lock = RwLock::new(42);
//! let guard = resilient_read(&lock);
//! println!("Value: {}", *guard);
//! ```

pub mod locks;

pub use locks::{resilient_read, resilient_write, try_resilient_read, try_resilient_write};
