// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI/env argument parsing for per-subsystem debug flags.
//!
//! Supports `--debug-session`, `--debug-channel`, etc., and `--debug-all`.

use std::collections::HashMap;
use std::env;

use crate::KNOWN_SUBSYSTEMS;

#[derive(Debug, Clone, Default)]
pub struct SubsystemDebugFlags {
    pub enabled: HashMap<String, bool>,
}

impl SubsystemDebugFlags {
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut enabled = HashMap::new();
        let mut debug_all = false;

        for arg in args {
            if arg == "--debug-all" {
                debug_all = true;
                continue;
            }
            if let Some(subsystem) = arg.strip_prefix("--debug-") {
                enabled.insert(subsystem.to_string(), true);
            }
        }

        if debug_all {
            for subsystem in KNOWN_SUBSYSTEMS {
                enabled.insert(subsystem.to_string(), true);
            }
        }

        Self { enabled }
    }

    pub fn is_enabled(&self, subsystem: &str) -> bool {
        self.enabled.contains_key(subsystem)
    }

    pub fn to_filter_string(&self) -> String {
        if self.enabled.is_empty() {
            return "info".to_string();
        }
        let mut filters: Vec<String> =
            self.enabled.keys().map(|s| format!("{s}=debug")).collect();
        filters.push("info".to_string());
        filters.join(",")
    }
}

/// Parse debug flags from both `std::env::args()` and `BEETLERELAY_DEBUG`
/// (comma-separated subsystem names, or `all`).
pub fn parse_debug_flags() -> SubsystemDebugFlags {
    let mut flags = SubsystemDebugFlags::from_args(env::args());

    if let Ok(value) = env::var("BEETLERELAY_DEBUG") {
        if value == "all" {
            for subsystem in KNOWN_SUBSYSTEMS {
                flags.enabled.insert(subsystem.to_string(), true);
            }
        } else {
            for subsystem in value.split(',') {
                let subsystem = subsystem.trim();
                if !subsystem.is_empty() {
                    flags.enabled.insert(subsystem.to_string(), true);
                }
            }
        }
    }

    flags
}
