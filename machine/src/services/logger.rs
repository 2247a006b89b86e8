/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! A [`log::Log`] implementation over the kernel's existing console path, so
//! subsystems can use `log::info!`/`log::warn!`/`log::error!` instead of
//! reaching for `println!` directly. Timestamps reuse the same uptime clock
//! the `info!`/`warn!` macros already stamp their output with.

use log::{Level, LevelFilter, Log, Metadata, Record};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let timestamp = crate::time::time_manager().uptime();
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };

        crate::println!(
            "[{:>3}.{:06} {}] {}",
            timestamp.as_secs(),
            timestamp.subsec_micros(),
            level,
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install the kernel logger as the global `log` facade backend. Must be
/// called exactly once, after the console driver is live.
///
/// # Errors
/// Returns an error if a logger has already been installed.
pub fn init(max_level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(max_level);
    Ok(())
}
