// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! Architectural timer primitives, built on the ARMv8 generic timer
//! (`CNTPCT_EL0`/`CNTFRQ_EL0`). This is distinct from the BCM System Timer
//! peripheral (see `devices::system_timer`), which the board uses for its
//! programmable compare-match IRQs.

use aarch64_cpu::registers::{CNTFRQ_EL0, CNTPCT_EL0};
use core::time::Duration;
use tock_registers::interfaces::Readable;

const NS_PER_S: u64 = 1_000_000_000;

fn frequency() -> u64 {
    CNTFRQ_EL0.get()
}

/// Smallest resolution this timer can represent.
pub fn resolution() -> Duration {
    Duration::from_nanos(NS_PER_S / frequency())
}

/// Time elapsed since the counter was started (by firmware, before the kernel ran).
pub fn uptime() -> Duration {
    let ticks = CNTPCT_EL0.get();
    let freq = frequency();

    let secs = ticks / freq;
    let subsec_ticks = ticks % freq;
    let nanos = (subsec_ticks * NS_PER_S) / freq;

    Duration::new(secs, nanos as u32)
}

/// Busy-loop for at least `duration`.
pub fn spin_for(duration: Duration) {
    let freq = frequency();
    let start = CNTPCT_EL0.get();
    let wait_ticks = (duration.as_nanos() as u64 * freq) / NS_PER_S;

    while CNTPCT_EL0.get().wrapping_sub(start) < wait_ticks {
        core::hint::spin_loop();
    }
}
