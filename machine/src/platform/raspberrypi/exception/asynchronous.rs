// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! Platform asynchronous exception handling.

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Export for reuse in generic asynchronous.rs.
pub use crate::platform::device_driver::IRQNumber;

#[cfg(feature = "rpi3")]
pub(in crate::platform) mod irq_map {
    use crate::platform::device_driver::{IRQNumber, PeripheralIRQ};

    pub const PL011_UART: IRQNumber = IRQNumber::Peripheral(PeripheralIRQ::new(57));
}

#[cfg(feature = "rpi4")]
pub(in crate::platform) mod irq_map {
    use crate::platform::device_driver::IRQNumber;

    pub const PL011_UART: IRQNumber = IRQNumber::new(153);
}

//--------------------------------------------------------------------------------------------------
// Global instances
//--------------------------------------------------------------------------------------------------

#[cfg(feature = "rpi3")]
static INTERRUPT_CONTROLLER: crate::platform::device_driver::InterruptController = unsafe {
    crate::platform::device_driver::InterruptController::new(crate::memory::Address::new(
        crate::platform::BcmHost::get_peripheral_address() + 0x0000_B200,
    ))
};

// The BCM2711's GIC-400 lives outside the legacy peripheral block, at a fixed address
// independent of `BcmHost::get_peripheral_address()`.
#[cfg(feature = "rpi4")]
static GIC: crate::platform::device_driver::GICv2 = unsafe {
    crate::platform::device_driver::GICv2::new(
        crate::memory::Address::new(0xff84_1000),
        crate::memory::Address::new(0xff84_2000),
    )
};

/// Return a reference to the platform's global IRQ manager.
#[cfg(feature = "rpi3")]
pub fn irq_manager(
) -> &'static impl crate::exception::asynchronous::interface::IRQManager<IRQNumberType = IRQNumber>
{
    &INTERRUPT_CONTROLLER
}

/// Return a reference to the platform's global IRQ manager.
#[cfg(feature = "rpi4")]
pub fn irq_manager(
) -> &'static impl crate::exception::asynchronous::interface::IRQManager<IRQNumberType = IRQNumber>
{
    &GIC
}
