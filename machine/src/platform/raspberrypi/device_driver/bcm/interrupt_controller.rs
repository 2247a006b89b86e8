/*
 * SPDX-License-Identifier: MIT OR BlueOak-1.0.0
 * Copyright (c) 2018-2019 Andre Richter <andre.o.richter@gmail.com>
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 * Original code distributed under MIT, additional changes are under BlueOak-1.0.0
 */

//! The BCM2837 legacy interrupt controller (RPi3). Distinguishes a handful of
//! "basic" sources (ARM-core-private: timers, mailboxes, ...) from 64 GPU-routed
//! peripheral sources. There is no end-of-interrupt register; a pending source
//! simply disappears from the pending bitmask once its peripheral has been
//! serviced, so "acknowledgment" for the dispatcher's ordering rule is a no-op
//! here (the peripheral driver itself clears its own pending condition).

use crate::{
    exception::asynchronous::{interface, HandlerTable, IRQContext, IRQHandlerDescriptor, IRQNumber},
    memory::{Address, Virtual},
    platform::device_driver::common::MMIODerefWrapper,
    synchronization::{interface::ReadWriteEx, InitStateLock},
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
        (0x00 => IRQBasicPending: ReadOnly<u32>),
        (0x04 => IRQPending: [ReadOnly<u32>; 2]),
        (0x0c => FIQControl: ReadWrite<u32>),
        (0x10 => EnableIRQs: [ReadWrite<u32>; 2]),
        (0x18 => EnableBasicIRQs: ReadWrite<u32>),
        (0x1c => DisableIRQs: [ReadWrite<u32>; 2]),
        (0x20 => DisableBasicIRQs: ReadWrite<u32>),
        (0x24 => @END),
    }
}

type Registers = MMIODerefWrapper<RegisterBlock>;

const PERIPHERAL_TABLE_SIZE: usize = 8;
const LOCAL_TABLE_SIZE: usize = 4;

struct InterruptControllerInner {
    registers: Registers,
    peripheral_handlers: [HandlerTable<PERIPHERAL_TABLE_SIZE, IRQNumber>; 64],
    local_handlers: [HandlerTable<LOCAL_TABLE_SIZE, IRQNumber>; 12],
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Representation of the BCM2837 interrupt controller.
pub struct InterruptController {
    inner: InitStateLock<InterruptControllerInner>,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl InterruptControllerInner {
    pub const unsafe fn new(mmio_base_addr: Address<Virtual>) -> Self {
        const EMPTY_PERIPHERAL: HandlerTable<PERIPHERAL_TABLE_SIZE, IRQNumber> = HandlerTable::new();
        const EMPTY_LOCAL: HandlerTable<LOCAL_TABLE_SIZE, IRQNumber> = HandlerTable::new();

        Self {
            registers: Registers::new(mmio_base_addr),
            peripheral_handlers: [EMPTY_PERIPHERAL; 64],
            local_handlers: [EMPTY_LOCAL; 12],
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl InterruptController {
    /// `mmio_base_addr` is the address of the interrupt controller's registers.
    ///
    /// # Safety
    ///
    /// - The user must ensure to provide a correct MMIO start address.
    pub const unsafe fn new(mmio_base_addr: Address<Virtual>) -> Self {
        Self {
            inner: InitStateLock::new(InterruptControllerInner::new(mmio_base_addr)),
        }
    }
}

impl interface::IRQManager for InterruptController {
    type IRQNumberType = IRQNumber;

    fn register_handler(
        &self,
        descriptor: IRQHandlerDescriptor<Self::IRQNumberType>,
    ) -> Result<(), &'static str> {
        self.inner.write(|inner| match descriptor.number() {
            IRQNumber::Local(n) => inner.local_handlers[n.get()].insert(descriptor),
            IRQNumber::Peripheral(n) => inner.peripheral_handlers[n.get()].insert(descriptor),
        })
    }

    fn enable(&self, irq_number: &Self::IRQNumberType) {
        self.inner.write(|inner| match irq_number {
            IRQNumber::Local(n) => {
                let bit = 1u32 << n.get();
                inner.registers.EnableBasicIRQs.set(bit);
            }
            IRQNumber::Peripheral(n) => {
                let reg = n.get() / 32;
                let bit = 1u32 << (n.get() % 32);
                inner.registers.EnableIRQs[reg].set(bit);
            }
        });
    }

    fn handle_pending_irqs<'irq_context>(&'irq_context self, _ic: &IRQContext<'irq_context>) {
        self.inner.read(|inner| {
            let pending = inner.registers.IRQPending[0].get() as u64
                | (inner.registers.IRQPending[1].get() as u64) << 32;

            for n in 0..64 {
                if pending & (1 << n) != 0 {
                    inner.peripheral_handlers[n].run_with_ack(|| {});
                }
            }

            let basic_pending = inner.registers.IRQBasicPending.get();
            for n in 0..12 {
                if basic_pending & (1 << n) != 0 {
                    inner.local_handlers[n].run_with_ack(|| {});
                }
            }
        });
    }

    fn print_handler(&self) {
        self.inner.read(|inner| {
            crate::println!("      Peripheral handlers:");
            for table in inner.peripheral_handlers.iter() {
                table.print();
            }
            crate::println!("      Local handlers:");
            for table in inner.local_handlers.iter() {
                table.print();
            }
        });
    }
}
