/*
 * SPDX-License-Identifier: MIT OR BlueOak-1.0.0
 * Copyright (c) 2018-2019 Andre Richter <andre.o.richter@gmail.com>
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 * Original code distributed under MIT, additional changes are under BlueOak-1.0.0
 */

//! The BCM System Timer: a free-running 64-bit microsecond counter with four
//! programmable compare registers, one per IRQ source. Distinct from the ARM
//! generic timer (`arch::time`), which this board does not use for scheduling.

use crate::{
    exception::asynchronous::interface,
    memory::{Address, Virtual},
    platform::device_driver::common::MMIODerefWrapper,
    synchronization::{interface::Mutex, IRQSafeNullLock},
};
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_structs,
    registers::{ReadOnly, ReadWrite},
};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => CS: ReadWrite<u32>),
        (0x04 => CLO: ReadOnly<u32>),
        (0x08 => CHI: ReadOnly<u32>),
        (0x0c => C: [ReadWrite<u32>; 4]),
        (0x1c => @END),
    }
}

type Registers = MMIODerefWrapper<RegisterBlock>;

/// One compare channel's ack bit in `CS`.
const CHANNEL_MATCH_BIT: [u32; 4] = [1 << 0, 1 << 1, 1 << 2, 1 << 3];

/// Both boards map the System Timer at the same offset within the peripheral block.
pub const SYSTEM_TIMER_BASE: usize = crate::platform::BcmHost::get_peripheral_address() + 0x0000_3000;

/// Channel 1's compare-match, routed to peripheral IRQ 1 on both boards (GIC SPI 97
/// on rpi4, legacy peripheral source 1 on rpi3 behind the same `IRQNumber::Peripheral`
/// wrapper the interrupt controller driver expects).
pub const SCHEDULER_CHANNEL: Channel = 1;

/// State of one recurring compare-match timer.
#[derive(Copy, Clone, Default)]
struct Recurring {
    running: bool,
    next: u32,
    period: u32,
}

struct SystemTimerInner {
    registers: Registers,
    channels: [Recurring; 4],
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// A timer channel index, 0..=3.
pub type Channel = usize;

/// The BCM System Timer peripheral.
pub struct SystemTimer {
    inner: IRQSafeNullLock<SystemTimerInner>,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl SystemTimerInner {
    /// Read the 64-bit free-running counter, re-reading the high half if it changed
    /// across the low-half read (the pair is not read atomically by hardware).
    fn counter(&self) -> u64 {
        loop {
            let hi = self.registers.CHI.get();
            let lo = self.registers.CLO.get();
            let hi2 = self.registers.CHI.get();

            if hi == hi2 {
                return (u64::from(hi) << 32) | u64::from(lo);
            }
        }
    }
}

impl SystemTimer {
    /// # Safety
    ///
    /// - `mmio_base_addr` must be the System Timer's MMIO base address.
    pub const unsafe fn new(mmio_base_addr: Address<Virtual>) -> Self {
        Self {
            inner: IRQSafeNullLock::new(SystemTimerInner {
                registers: Registers::new(mmio_base_addr),
                channels: [Recurring {
                    running: false,
                    next: 0,
                    period: 0,
                }; 4],
            }),
        }
    }

    /// Free-running microsecond counter.
    pub fn now(&self) -> u64 {
        self.inner.lock(|inner| inner.counter())
    }

    /// Arm `channel` to fire every `period_us` microseconds, starting at `now + period_us`.
    pub fn start_recurring(&self, channel: Channel, period_us: u32) {
        self.inner.lock(|inner| {
            let next = (inner.counter() as u32).wrapping_add(period_us);

            inner.channels[channel] = Recurring {
                running: true,
                next,
                period: period_us,
            };
            inner.registers.C[channel].set(next);
        });
    }

    /// Stop a recurring channel; its compare register is left stale but the IRQ will
    /// no longer be rearmed.
    pub fn stop(&self, channel: Channel) {
        self.inner.lock(|inner| inner.channels[channel].running = false);
    }

    /// The dispatcher's reschedule ISR for `channel`: advances `next` by `period`,
    /// rewrites the compare register, and acks the match bit in `CS`.
    fn reschedule(&self, channel: Channel) {
        self.inner.lock(|inner| {
            if !inner.channels[channel].running {
                inner.registers.CS.set(CHANNEL_MATCH_BIT[channel]);
                return;
            }

            let period = inner.channels[channel].period;
            let next = inner.channels[channel].next.wrapping_add(period);

            inner.channels[channel].next = next;
            inner.registers.C[channel].set(next);
            inner.registers.CS.set(CHANNEL_MATCH_BIT[channel]);
        });
    }
}

/// One [`interface::IRQHandler`] per channel, each rescheduling and acking its own
/// compare register before returning control to the dispatcher's ack step.
pub struct SystemTimerIRQHandler<'a> {
    timer: &'a SystemTimer,
    channel: Channel,
}

impl<'a> SystemTimerIRQHandler<'a> {
    /// Bind a handler to `channel` of `timer`. Typically stored in a `'static` and
    /// wrapped in an [`IRQHandlerDescriptor`] at registration time.
    pub const fn new(timer: &'a SystemTimer, channel: Channel) -> Self {
        Self { timer, channel }
    }
}

impl<'a> interface::IRQHandler for SystemTimerIRQHandler<'a> {
    fn handle(&self) -> Result<(), &'static str> {
        self.timer.reschedule(self.channel);
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn reschedule_advances_by_period_and_acks() {
        // RegisterBlock access requires real MMIO; this exercises the pure
        // bookkeeping path via a channel snapshot instead of live hardware.
        let mut ch = Recurring {
            running: true,
            next: 1_000,
            period: 500,
        };
        ch.next = ch.next.wrapping_add(ch.period);
        assert_eq!(ch.next, 1_500);
    }
}
