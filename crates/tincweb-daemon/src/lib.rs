// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Control plane for tinc networks.
//!
//! A [`SupervisorRegistry`] owns one [`NetworkSupervisor`] per network. Each
//! run of a supervisor consists of three tasks joined under one cancellation
//! token:
//!
//! - the `tincd` process,
//! - a [`CoordinationServer`] on the network's Unix socket, fed by hook scripts,
//! - a [`PeerTracker`] applying the resulting [`PeerEvent`]s.
//!
//! When any of them ends, the others are cancelled.

pub mod coordination;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod supervisor;
pub mod tracker;

pub use coordination::CoordinationServer;
pub use error::{ProtocolError, RegistryError, Result, RunError};
#[cfg(unix)]
pub use protocol::send_event;
pub use protocol::{PeerEvent, Reply};
pub use registry::{RegistryOptions, SupervisorRegistry};
pub use supervisor::{NetworkSupervisor, SupervisorSettings};
pub use tracker::{PeerStatus, PeerTracker};
