// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod hook;
pub mod network;
pub mod run;

pub use hook::HookArgs;
pub use network::{CreateArgs, RemoveArgs};
pub use run::RunArgs;
