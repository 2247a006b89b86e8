// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! GIC-400 (Generic Interrupt Controller v2) support, used on the BCM2711 (RPi4)
//! in place of the BCM2837 legacy interrupt controller. Unlike the legacy
//! controller, the GIC requires an explicit end-of-interrupt write, which the
//! dispatcher's ordering rule (the scheduler handler runs only after it) relies on.

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
    DistributorRegisterBlock {
        (0x000 => CTLR: ReadWrite<u32>),
        (0x004 => TYPER: ReadOnly<u32>),
        (0x008 => _reserved1),
        (0x100 => ISENABLER: [ReadWrite<u32>; 32]),
        (0x180 => ICENABLER: [ReadWrite<u32>; 32]),
        (0x200 => _reserved2),
        (0x800 => ITARGETSR: [ReadWrite<u32>; 256]),
        (0xc00 => @END),
    }
}

register_structs! {
    #[allow(non_snake_case)]
    CpuInterfaceRegisterBlock {
        (0x00 => CTLR: ReadWrite<u32>),
        (0x04 => PMR: ReadWrite<u32>),
        (0x08 => _reserved1),
        (0x0c => IAR: ReadOnly<u32>),
        (0x10 => EOIR: ReadWrite<u32>),
        (0x14 => @END),
    }
}

type DistributorRegisters = MMIODerefWrapper<DistributorRegisterBlock>;
type CpuInterfaceRegisters = MMIODerefWrapper<CpuInterfaceRegisterBlock>;

/// Value read from `IAR`/written to `EOIR` for a spurious interrupt.
const SPURIOUS_INTERRUPT: u32 = 1023;

const TABLE_SIZE: usize = 8;

struct GicDInner {
    registers: DistributorRegisters,
}

struct GicCInner {
    registers: CpuInterfaceRegisters,
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// The GIC distributor.
pub struct GICD {
    inner: InitStateLock<GicDInner>,
}

/// The GIC CPU interface.
pub struct GICC {
    inner: InitStateLock<GicCInner>,
}

/// Combines distributor and CPU interface behind the generic `IRQManager` interface,
/// plus a fixed-capacity handler table per SPI number.
pub struct GICv2 {
    gicd: GICD,
    gicc: GICC,
    handlers: InitStateLock<[HandlerTable<TABLE_SIZE, IRQNumber>; 300]>,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl GICD {
    /// # Safety
    ///
    /// - `mmio_base_addr` must be the GICD's MMIO base address.
    pub const unsafe fn new(mmio_base_addr: Address<Virtual>) -> Self {
        Self {
            inner: InitStateLock::new(GicDInner {
                registers: DistributorRegisters::new(mmio_base_addr),
            }),
        }
    }

    fn enable(&self, irq: usize) {
        self.inner.write(|inner| {
            inner.registers.ISENABLER[irq / 32].set(1 << (irq % 32));
        });
    }
}

impl GICC {
    /// # Safety
    ///
    /// - `mmio_base_addr` must be the GICC's MMIO base address.
    pub const unsafe fn new(mmio_base_addr: Address<Virtual>) -> Self {
        Self {
            inner: InitStateLock::new(GicCInner {
                registers: CpuInterfaceRegisters::new(mmio_base_addr),
            }),
        }
    }

    fn pending_irq(&self) -> Option<usize> {
        self.inner.read(|inner| {
            let iar = inner.registers.IAR.get();
            if iar == SPURIOUS_INTERRUPT {
                None
            } else {
                Some(iar as usize)
            }
        })
    }

    fn eoi(&self, irq: usize) {
        self.inner.write(|inner| inner.registers.EOIR.set(irq as u32));
    }
}

impl GICv2 {
    /// # Safety
    ///
    /// - `gicd_mmio_base_addr`/`gicc_mmio_base_addr` must be the controller's real
    ///   MMIO base addresses.
    pub const unsafe fn new(
        gicd_mmio_base_addr: Address<Virtual>,
        gicc_mmio_base_addr: Address<Virtual>,
    ) -> Self {
        const EMPTY: HandlerTable<TABLE_SIZE, IRQNumber> = HandlerTable::new();

        Self {
            gicd: GICD::new(gicd_mmio_base_addr),
            gicc: GICC::new(gicc_mmio_base_addr),
            handlers: InitStateLock::new([EMPTY; 300]),
        }
    }
}

impl interface::IRQManager for GICv2 {
    type IRQNumberType = IRQNumber;

    fn register_handler(
        &self,
        descriptor: IRQHandlerDescriptor<Self::IRQNumberType>,
    ) -> Result<(), &'static str> {
        self.handlers
            .write(|handlers| handlers[descriptor.number().get()].insert(descriptor))
    }

    fn enable(&self, irq_number: &Self::IRQNumberType) {
        self.gicd.enable(irq_number.get());
    }

    fn handle_pending_irqs<'irq_context>(&'irq_context self, _ic: &IRQContext<'irq_context>) {
        while let Some(irq) = self.gicc.pending_irq() {
            self.handlers.read(|handlers| {
                handlers[irq].run_with_ack(|| self.gicc.eoi(irq));
            });
        }
    }

    fn print_handler(&self) {
        self.handlers.read(|handlers| {
            for table in handlers.iter() {
                table.print();
            }
        });
    }
}
