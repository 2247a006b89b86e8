/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Physical memory manager (C1): a bitmap frame allocator covering every
//! frame between the end of the DMA heap and the MMIO base, backed by
//! `libmemory::FrameAllocator`.

use crate::sync::NullLock;
use libmemory::FrameAllocator;
use once_cell::unsync::Lazy;

/// First frame managed: right past the DMA heap used by [`crate::DMA_ALLOCATOR`].
pub const PROCESS_START: usize = crate::DMA_HEAP_END + 1;

cfg_if::cfg_if! {
    if #[cfg(feature = "rpi4")] {
        /// BCM2711 peripheral base; frames at or above this address are MMIO, not RAM.
        pub const MMIO_BASE: usize = 0xFE00_0000;
    } else {
        /// BCM2837 peripheral base; frames at or above this address are MMIO, not RAM.
        pub const MMIO_BASE: usize = 0x3F00_0000;
    }
}

const FRAME_COUNT: usize = (MMIO_BASE - PROCESS_START) / libmemory::PAGE_SIZE;
const BITMAP_WORDS: usize = FrameAllocator::bitmap_words_for(FRAME_COUNT);

static mut BITMAP: [u64; BITMAP_WORDS] = [0; BITMAP_WORDS];

/// The kernel-wide physical frame allocator.
pub static MEMORY_MANAGER: NullLock<Lazy<FrameAllocator<'static>>> =
    NullLock::new(Lazy::new(|| unsafe {
        #[allow(static_mut_refs)]
        FrameAllocator::new(PROCESS_START, FRAME_COUNT, &mut BITMAP)
    }));
