#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![allow(stable_features)]
#![allow(incomplete_features)]
#![allow(internal_features)]

// The architecture-specific modules only make sense when actually cross-compiled for
// the target; `frame_allocator` is pure logic and is exercised with plain `#[test]`
// on the host instead (see its `mod tests`).
#[cfg(all(not(test), not(target_arch = "aarch64")))]
use architecture_not_supported_sorry;

/// Architecture-specific code.
#[cfg(target_arch = "aarch64")]
#[macro_use]
pub mod arch;
pub mod frame_allocator;
#[cfg(target_arch = "aarch64")]
pub mod memory;

pub use frame_allocator::FrameAllocator;
