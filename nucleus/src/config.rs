/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Kernel configuration (C10 supplement): parses the firmware-provided
//! command line once during `platform_init::init` and bundles the result
//! into a [`KernelContext`] handed to subsystems that need it, rather than
//! reaching for free-standing globals for every cross-cutting value.

use log::LevelFilter;

/// Recognized `console=` sinks (spec.md §6).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConsoleSink {
    Ttys0,
    Ttys1,
}

/// Parsed form of the space-separated `key=value` kernel command line.
#[derive(Debug, Copy, Clone)]
pub struct KernelConfig {
    console: ConsoleSink,
    baud: Option<u32>,
    log_level: LevelFilter,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::const_default()
    }
}

impl KernelConfig {
    /// `const fn` form of [`Default::default`], usable to seed `static` items.
    pub const fn const_default() -> Self {
        Self {
            console: ConsoleSink::Ttys0,
            baud: None,
            log_level: LevelFilter::Info,
        }
    }
    /// Parse `cmdline`, falling back to defaults for any key that is
    /// missing or malformed. Unrecognized keys are ignored.
    pub fn parse(cmdline: &str) -> Self {
        let mut config = Self::default();
        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            match key {
                "console" => {
                    let mut parts = value.splitn(2, ',');
                    match parts.next() {
                        Some("ttys0") => config.console = ConsoleSink::Ttys0,
                        Some("ttys1") => config.console = ConsoleSink::Ttys1,
                        _ => {}
                    }
                    config.baud = parts.next().and_then(|b| b.parse().ok());
                }
                "log" => {
                    config.log_level = match value {
                        "error" => LevelFilter::Error,
                        "warn" => LevelFilter::Warn,
                        "info" => LevelFilter::Info,
                        "debug" => LevelFilter::Debug,
                        "trace" => LevelFilter::Trace,
                        "off" => LevelFilter::Off,
                        _ => config.log_level,
                    };
                }
                _ => {}
            }
        }
        config
    }

    pub fn console(&self) -> ConsoleSink {
        self.console
    }

    pub fn baud(&self) -> Option<u32> {
        self.baud
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }
}

/// Read-only state shared by subsystems after `platform_init::init` runs,
/// taking the place of the ad hoc module-level globals spec.md §9 calls out
/// (`__os_static_heap` and friends in the original). Constructed exactly
/// once; cheap to `Copy` since every field is either `Copy` itself or, for
/// the volume, already a `Copy` struct.
#[derive(Debug, Copy, Clone)]
pub struct KernelContext {
    config: KernelConfig,
    volume: Option<fat32::Volume>,
}

impl KernelContext {
    pub const fn new(config: KernelConfig) -> Self {
        Self {
            config,
            volume: None,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn volume(&self) -> Option<fat32::Volume> {
        self.volume
    }

    pub fn set_volume(&mut self, volume: fat32::Volume) {
        self.volume = Some(volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_cmdline_is_empty() {
        let config = KernelConfig::parse("");
        assert_eq!(config.console(), ConsoleSink::Ttys0);
        assert_eq!(config.baud(), None);
        assert_eq!(config.log_level(), LevelFilter::Info);
    }

    #[test]
    fn parses_console_and_baud() {
        let config = KernelConfig::parse("console=ttys1,115200");
        assert_eq!(config.console(), ConsoleSink::Ttys1);
        assert_eq!(config.baud(), Some(115200));
    }

    #[test]
    fn parses_log_level() {
        let config = KernelConfig::parse("log=debug");
        assert_eq!(config.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn ignores_unknown_keys_and_malformed_tokens() {
        let config = KernelConfig::parse("quux=1 console ohno=what log=trace");
        assert_eq!(config.log_level(), LevelFilter::Trace);
        assert_eq!(config.console(), ConsoleSink::Ttys0);
    }

    #[test]
    fn malformed_console_value_keeps_default() {
        let config = KernelConfig::parse("console=bogus");
        assert_eq!(config.console(), ConsoleSink::Ttys0);
    }
}
