// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! Device driver.

#[cfg(feature = "rpi4")]
mod arm;
#[cfg(any(feature = "rpi3", feature = "rpi4"))]
mod bcm;

pub mod common;

#[cfg(feature = "rpi4")]
pub use arm::*;
#[cfg(any(feature = "rpi3", feature = "rpi4"))]
pub use bcm::*;

//--------------------------------------------------------------------------------------------------
// IRQ number types
//--------------------------------------------------------------------------------------------------
//
// RPi3 uses the BCM2837 legacy interrupt controller, which distinguishes a handful of
// "basic"/local sources (ARM timer, mailboxes, ...) from 64 GPU-routed peripheral
// sources. RPi4 replaces it with a standard GIC-400, which addresses every source
// through one flat SPI number space.

#[cfg(feature = "rpi3")]
mod irq_number {
    use super::common::BoundedUsize;

    /// A BCM2837 "local"/basic interrupt source (ARM-core-private).
    pub type LocalIRQ = BoundedUsize<11>;
    /// A BCM2837 GPU-routed peripheral interrupt source.
    pub type PeripheralIRQ = BoundedUsize<63>;

    /// An interrupt source known to the BCM2837 legacy interrupt controller.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub enum IRQNumber {
        /// A local/basic source.
        Local(LocalIRQ),
        /// A GPU-routed peripheral source.
        Peripheral(PeripheralIRQ),
    }

    impl core::fmt::Display for IRQNumber {
        fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
            match self {
                IRQNumber::Local(n) => write!(f, "Local({})", n),
                IRQNumber::Peripheral(n) => write!(f, "Peripheral({})", n),
            }
        }
    }
}

#[cfg(feature = "rpi4")]
mod irq_number {
    use super::common::BoundedUsize;

    /// A GIC-400 shared peripheral interrupt number, flat across the whole SoC.
    /// BCM2711 wires up to 300 SPIs; index 299 is the last valid one.
    pub type IRQNumber = BoundedUsize<299>;
}

pub use irq_number::IRQNumber;
#[cfg(feature = "rpi3")]
pub use irq_number::{LocalIRQ, PeripheralIRQ};
