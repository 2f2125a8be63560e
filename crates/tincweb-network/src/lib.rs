// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! On-disk tinc network definitions.
//!
//! A network lives in its own directory:
//!
//! ```text
//! <root>/
//!   config.json         persisted [`Config`]
//!   tinc.conf           regenerated on every configure
//!   hosts/<node>        one tinc host file per known node
//!   tinc-up, tinc-down, subnet-up, subnet-down
//!   pid.run, log.txt    owned by tincd
//!   coordination.sock   bound by the daemon while the network runs
//! ```
//!
//! [`Network::configure`] regenerates `tinc.conf`, the self host file and the
//! platform hook scripts. The scripts call back into the daemon binary through
//! the coordination socket so the daemon learns about topology changes.

pub mod config;
pub mod error;
pub mod network;
pub mod node;
pub mod scripts;

pub use config::{Config, Upgrade};
pub use error::{NetworkError, Result};
pub use network::Network;
pub use node::{validate_name, Address, Node};
pub use scripts::{HookKind, HookScripts, Platform};
