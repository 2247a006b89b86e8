#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![feature(decl_macro)]
#![feature(allocator_api)]
#![feature(format_args_nl)]
#![feature(core_intrinsics)]
#![feature(strict_provenance)]
#![feature(stmt_expr_attributes)]
#![feature(slice_ptr_get)]
#![feature(nonnull_slice_from_raw_parts)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::nonstandard_macro_braces)] // https://github.com/shepmaster/snafu/issues/296
#![allow(missing_docs)] // Temp: switch to deny
#![deny(warnings)]

#[cfg(all(not(test), not(target_arch = "aarch64")))]
use architecture_not_supported_sorry;

use {
    buddy_alloc::{BuddyAlloc, BuddyAllocParam},
    once_cell::unsync::Lazy,
};

// Board-agnostic DMA heap window; see `machine::platform::memory::map` for the
// board-specific MMIO layout.
pub const DMA_HEAP_START: usize = 0x0020_0000;
pub const DMA_HEAP_END: usize = 0x005F_FFFF;

#[cfg(target_arch = "aarch64")]
pub mod cli;
pub mod config;
pub mod memory_manager;
#[cfg(target_arch = "aarch64")]
pub mod platform_init;
pub mod registry;
mod sync;
pub mod task;

/// The global console. Output of the kernel print! and println! macros goes here.
// pub static CONSOLE: sync::NullLock<devices::Console> = sync::NullLock::new(devices::Console::new());

/// The global allocator for DMA-able memory. That is, memory which is tagged
/// non-cacheable in the page tables.
pub static DMA_ALLOCATOR: sync::NullLock<Lazy<BuddyAlloc>> =
    sync::NullLock::new(Lazy::new(|| unsafe {
        BuddyAlloc::new(BuddyAllocParam::new(
            // @todo Init this after we loaded boot memory map
            DMA_HEAP_START as *const u8,
            DMA_HEAP_END - DMA_HEAP_START,
            64,
        ))
    }));

// Try the following arguments instead to see all mailbox operations
// fail. It will cause the allocator to use memory that is marked
// cacheable and therefore not DMA-safe. The answer from the VideoCore
// won't be received by the CPU because it reads an old cached value
// that resembles an error case instead.

// 0x00600000 as usize,
// 0x007FFFFF as usize,
