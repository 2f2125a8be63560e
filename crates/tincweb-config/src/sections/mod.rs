// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod daemon;
mod logging;

pub use daemon::{DaemonConfig, DaemonConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
