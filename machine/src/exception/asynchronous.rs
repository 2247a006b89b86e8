// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! Generic asynchronous exception handling: hardware IRQ dispatch.
//!
//! The board-specific interrupt controller (BCM2837 legacy registers on RPi3,
//! GIC-400 on RPi4) lives under `platform::device_driver` and implements
//! [`interface::IRQManager`]. This module supplies everything that does not vary
//! between controllers: the IRQ-masking primitives, the registration types, and
//! the [`IRQContext`] token that proves a call originates from inside the IRQ vector.

use aarch64_cpu::registers::*;
use tock_registers::interfaces::Readable;

pub use crate::platform::device_driver::IRQNumber;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Asynchronous exception interfaces.
pub mod interface {
    /// A handler for a single interrupt source.
    pub trait IRQHandler {
        /// Called by the dispatcher when this handler's interrupt fires.
        fn handle(&self) -> Result<(), &'static str>;
    }

    /// Implemented by the board's interrupt controller driver.
    pub trait IRQManager {
        /// Platform-specific type identifying an interrupt source.
        type IRQNumberType: Copy;

        /// Register a handler for `descriptor.number`. Fails if the number is not a
        /// source known to this controller.
        fn register_handler(
            &self,
            descriptor: super::IRQHandlerDescriptor<Self::IRQNumberType>,
        ) -> Result<(), &'static str>;

        /// Enable (unmask) an interrupt source at the controller.
        fn enable(&self, irq_number: &Self::IRQNumberType);

        /// Called from the IRQ vector. Resolves the pending source(s) and runs their
        /// registered handlers, observing the ordering rule: any handler registered
        /// as [`super::HandlerKind::TaskScheduler`] runs last, after end-of-interrupt
        /// has been acknowledged to the controller, because it may perform a context
        /// switch that never returns to the interrupted task.
        fn handle_pending_irqs<'irq_context>(&'irq_context self, ic: &super::IRQContext<'irq_context>);

        /// Print a diagnostic list of registered handlers.
        fn print_handler(&self);
    }
}

/// Distinguishes the scheduler's ISR from ordinary ones (data model §3.4).
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum HandlerKind {
    /// Runs in insertion order, before end-of-interrupt is acknowledged.
    Ordinary,
    /// Runs last, after end-of-interrupt has been written. May not return to the
    /// interrupted task.
    TaskScheduler,
}

/// A proof that the holder is executing inside IRQ context. Can only be constructed
/// from inside the IRQ vector, and only lives for the duration of one dispatch.
pub struct IRQContext<'irq_context> {
    _0: core::marker::PhantomData<&'irq_context ()>,
}

/// A registration for one handler on one interrupt source.
#[derive(Copy, Clone)]
pub struct IRQHandlerDescriptor<T>
where
    T: Copy,
{
    /// Interrupt source this handler is registered for.
    number: T,
    /// Friendly name for diagnostics.
    name: &'static str,
    /// Ordinary vs. scheduler; see [`HandlerKind`].
    kind: HandlerKind,
    /// The handler implementation.
    handler: &'static (dyn interface::IRQHandler + Sync),
}

/// Fixed-capacity, insertion-ordered list of handlers for a single interrupt source,
/// implementing the "ordinary handlers, then EOI, then the scheduler handler" rule.
pub struct HandlerTable<const N: usize, T>
where
    T: Copy,
{
    descriptors: [Option<IRQHandlerDescriptor<T>>; N],
    next: usize,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl<'irq_context> IRQContext<'irq_context> {
    /// Create an IRQ context token.
    ///
    /// # Safety
    ///
    /// - Must only be called from inside the IRQ exception vector.
    #[inline(always)]
    pub unsafe fn new() -> Self {
        Self {
            _0: core::marker::PhantomData,
        }
    }
}

impl<T> IRQHandlerDescriptor<T>
where
    T: Copy,
{
    /// Create a descriptor for an ordinary handler.
    pub const fn new(
        number: T,
        name: &'static str,
        handler: &'static (dyn interface::IRQHandler + Sync),
    ) -> Self {
        Self {
            number,
            name,
            kind: HandlerKind::Ordinary,
            handler,
        }
    }

    /// Create a descriptor for the task-scheduler's handler.
    pub const fn new_scheduler(
        number: T,
        name: &'static str,
        handler: &'static (dyn interface::IRQHandler + Sync),
    ) -> Self {
        Self {
            number,
            name,
            kind: HandlerKind::TaskScheduler,
            handler,
        }
    }

    /// The interrupt source this descriptor is registered for.
    pub const fn number(&self) -> T {
        self.number
    }

    /// Friendly name for diagnostics.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<const N: usize, T> HandlerTable<N, T>
where
    T: Copy,
{
    /// An empty table.
    pub const fn new() -> Self {
        Self {
            descriptors: [None; N],
            next: 0,
        }
    }

    /// Insert `descriptor` at the end of the table.
    pub fn insert(&mut self, descriptor: IRQHandlerDescriptor<T>) -> Result<(), &'static str> {
        if self.next >= N {
            return Err("IRQ handler table is full");
        }

        self.descriptors[self.next] = Some(descriptor);
        self.next += 1;

        Ok(())
    }

    /// Whether any handler is registered.
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }

    /// Run every ordinary handler in insertion order, call `ack` (the controller's
    /// end-of-interrupt write), then run the scheduler handler, if any, last.
    pub fn run_with_ack(&self, ack: impl FnOnce()) {
        let mut scheduler_descriptor = None;

        for descriptor in self.descriptors[..self.next].iter().flatten() {
            match descriptor.kind {
                HandlerKind::Ordinary => {
                    if let Err(e) = descriptor.handler.handle() {
                        crate::warn!("Error handling IRQ {}: {}", descriptor.name, e);
                    }
                }
                HandlerKind::TaskScheduler => scheduler_descriptor = Some(descriptor),
            }
        }

        ack();

        if let Some(descriptor) = scheduler_descriptor {
            if let Err(e) = descriptor.handler.handle() {
                crate::warn!("Error handling IRQ {}: {}", descriptor.name, e);
            }
        }
    }

    /// Print the registered handler names, in insertion order.
    pub fn print(&self) {
        for descriptor in self.descriptors[..self.next].iter().flatten() {
            crate::println!("            {}", descriptor.name());
        }
    }
}

/// Mask IRQs on this core.
#[inline(always)]
pub fn local_irq_mask() {
    DAIF.modify(DAIF::I::Masked);
}

/// Unmask IRQs on this core.
#[inline(always)]
pub fn local_irq_unmask() {
    DAIF.modify(DAIF::I::Unmasked);
}

/// Whether IRQs are currently masked on this core.
#[inline(always)]
pub fn is_local_irq_masked() -> bool {
    DAIF.matches_all(DAIF::I::Masked)
}

/// Execute the given closure with IRQs disabled, restoring the previous mask state
/// on exit.
#[inline(always)]
pub fn exec_with_irq_masked<T>(f: impl FnOnce() -> T) -> T {
    let was_masked = is_local_irq_masked();

    if !was_masked {
        local_irq_mask();
    }

    let ret = f();

    if !was_masked {
        local_irq_unmask();
    }

    ret
}

/// Return a reference to the platform's interrupt manager.
pub fn irq_manager() -> &'static impl interface::IRQManager<IRQNumberType = IRQNumber> {
    crate::platform::exception::asynchronous::irq_manager()
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(core::cell::Cell<u32>);
    unsafe impl Sync for Counter {}
    impl interface::IRQHandler for Counter {
        fn handle(&self) -> Result<(), &'static str> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test_case]
    fn scheduler_handler_runs_last_after_ack() {
        static ORDINARY: Counter = Counter(core::cell::Cell::new(0));
        static SCHEDULER: Counter = Counter(core::cell::Cell::new(0));

        let mut table: HandlerTable<4, u32> = HandlerTable::new();
        table
            .insert(IRQHandlerDescriptor::new_scheduler(0, "sched", &SCHEDULER))
            .unwrap();
        table
            .insert(IRQHandlerDescriptor::new(0, "ordinary", &ORDINARY))
            .unwrap();

        let mut ack_count = 0u32;
        table.run_with_ack(|| ack_count += 1);

        assert_eq!(ORDINARY.0.get(), 1);
        assert_eq!(SCHEDULER.0.get(), 1);
        assert_eq!(ack_count, 1);
    }

    #[test_case]
    fn table_rejects_insertion_past_capacity() {
        let mut table: HandlerTable<1, u32> = HandlerTable::new();
        static H: Counter = Counter(core::cell::Cell::new(0));

        assert!(table.insert(IRQHandlerDescriptor::new(0, "a", &H)).is_ok());
        assert!(table.insert(IRQHandlerDescriptor::new(0, "b", &H)).is_err());
    }
}
