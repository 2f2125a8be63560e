// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::sections::{DaemonConfigLayer, LoggingConfigLayer};

/// One partially specified configuration, as produced by a single source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfigFileLayer {
	pub daemon: Option<DaemonConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
}

impl DaemonConfigFileLayer {
	pub fn merge(&mut self, other: Self) {
		merge_section(&mut self.daemon, other.daemon, DaemonConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(base: &mut Option<T>, overlay: Option<T>, merge: fn(&mut T, T)) {
	match (base.as_mut(), overlay) {
		(Some(base), Some(overlay)) => merge(base, overlay),
		(None, Some(overlay)) => *base = Some(overlay),
		(_, None) => {}
	}
}
