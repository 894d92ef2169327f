// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Application layer: loads configuration, initializes logging, spawns one
//! `Session` per configured peripheral plus the upstream `RelayClient`, and
//! owns the shutdown/snapshot sequence described in the concurrency model.

pub mod link_factory;
pub mod orchestrator;

pub use link_factory::{BleLinkFactory, MemoryLinkFactory};
pub use orchestrator::{spawn_all, OrchestratorHandle};
