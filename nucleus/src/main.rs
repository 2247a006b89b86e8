#![no_std]
#![no_main]

#[cfg(not(target_arch = "aarch64"))]
use architecture_not_supported_sorry;

// `machine`'s reset handler zeroes .bss and then jumps here.
machine::entry!(kmain);

/// Kernel entry point, called from `machine`'s boot assembly once .bss is zeroed.
fn kmain(_dtb: u32) -> ! {
    if let Err(_e) = unsafe { nucleus::platform_init::init() } {
        panic!("platform init failed");
    }

    // The CLI now runs as a forked kernel task (see `platform_init::init`);
    // this context just idles until the preemptive tick switches away from it.
    machine::cpu::endless_sleep()
}

#[panic_handler]
fn panicked(_info: &core::panic::PanicInfo) -> ! {
    machine::cpu::endless_sleep()
}
