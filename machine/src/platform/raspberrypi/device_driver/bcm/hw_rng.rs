/*
 * SPDX-License-Identifier: MIT OR BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Hardware random number generator. The BCM2837 (RPi3) and BCM2711 (RPi4)
//! expose different register layouts for what is functionally the same IP
//! block; both warm up once and then hand out 32-bit words from a FIFO.

use crate::{
    memory::{Address, Virtual},
    platform::device_driver::common::MMIODerefWrapper,
    synchronization::{interface::Mutex, IRQSafeNullLock},
};
use tock_registers::{interfaces::{Readable, Writeable}, register_structs, registers::ReadWrite};

#[cfg(feature = "rpi3")]
register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => CTRL: ReadWrite<u32>),
        (0x04 => STATUS: ReadWrite<u32>),
        (0x08 => DATA: ReadWrite<u32>),
        (0x0c => _reserved1),
        (0x10 => INT_MASK: ReadWrite<u32>),
        (0x14 => @END),
    }
}

#[cfg(feature = "rpi4")]
register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => CTRL: ReadWrite<u32>),
        (0x04 => _reserved1),
        (0x0c => TOTAL_BIT_COUNT: ReadWrite<u32>),
        (0x10 => TOTAL_BIT_COUNT_THRESHOLD: ReadWrite<u32>),
        (0x14 => _reserved2),
        (0x20 => FIFO_DATA: ReadWrite<u32>),
        (0x24 => FIFO_COUNT: ReadWrite<u32>),
        (0x28 => @END),
    }
}

type Registers = MMIODerefWrapper<RegisterBlock>;

/// Both boards map the RNG at the same offset within the peripheral block.
pub const RNG_BASE: usize = crate::platform::BcmHost::get_peripheral_address() + 0x0010_4000;

struct Inner {
    registers: Registers,
}

/// The SoC's hardware random number generator.
pub struct HwRng {
    inner: IRQSafeNullLock<Inner>,
}

impl Inner {
    #[cfg(feature = "rpi3")]
    fn initialize(&self) {
        self.registers.STATUS.set(0x0004_0000);
        self.registers.INT_MASK.set(self.registers.INT_MASK.get() | 1);
        self.registers.CTRL.set(self.registers.CTRL.get() | 1);
    }

    #[cfg(feature = "rpi4")]
    fn initialize(&self) {
        const RBGEN_MASK: u32 = 0x0000_1fff;
        const DIV_CTRL_SHIFT: u32 = 13;

        self.registers.TOTAL_BIT_COUNT_THRESHOLD.set(0x0004_0000);
        self.registers.FIFO_COUNT.set(2 << 8);
        self.registers.CTRL.set((0x3 << DIV_CTRL_SHIFT) | RBGEN_MASK);

        while self.registers.TOTAL_BIT_COUNT.get() < 16 {
            core::hint::spin_loop();
        }
    }

    #[cfg(feature = "rpi3")]
    fn next_u32(&self) -> u32 {
        while (self.registers.STATUS.get() >> 24) == 0 {
            core::hint::spin_loop();
        }
        self.registers.DATA.get()
    }

    #[cfg(feature = "rpi4")]
    fn next_u32(&self) -> u32 {
        while self.registers.FIFO_COUNT.get() & 0xff == 0 {
            core::hint::spin_loop();
        }
        self.registers.FIFO_DATA.get()
    }
}

impl HwRng {
    /// # Safety
    ///
    /// - `mmio_base_addr` must be the RNG block's real MMIO base address.
    pub const unsafe fn new(mmio_base_addr: Address<Virtual>) -> Self {
        Self {
            inner: IRQSafeNullLock::new(Inner {
                registers: Registers::new(mmio_base_addr),
            }),
        }
    }

    /// Warm up the entropy source. Safe to call more than once.
    pub fn initialize(&self) {
        self.inner.lock(|inner| inner.initialize());
    }

    /// The next 32-bit random value.
    pub fn next_u32(&self) -> u32 {
        self.inner.lock(|inner| inner.next_u32())
    }

    /// The next 64-bit random value, built from two 32-bit draws.
    pub fn next_u64(&self) -> u64 {
        let hi = self.next_u32();
        let lo = self.next_u32();
        compose_u64(hi, lo)
    }
}

const fn compose_u64(hi: u32, lo: u32) -> u64 {
    (u64::from(hi) << 32) | u64::from(lo)
}

impl crate::drivers::interface::DeviceDriver for HwRng {
    type IRQNumberType = crate::platform::device_driver::IRQNumber;

    fn compatible(&self) -> &'static str {
        "BCM HW RNG"
    }

    unsafe fn init(&self) -> Result<(), &'static str> {
        self.initialize();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn compose_u64_packs_high_and_low_words() {
        assert_eq!(compose_u64(0x1234_5678, 0x9abc_def0), 0x1234_5678_9abc_def0);
    }

    #[test_case]
    fn compose_u64_zero_halves_are_zero() {
        assert_eq!(compose_u64(0, 0), 0);
    }
}
