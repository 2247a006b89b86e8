use {
    crate::{
        console, drivers,
        platform::{device_driver, memory::map::mmio},
    },
    core::sync::atomic::{AtomicBool, Ordering},
};

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Initialize the driver subsystem.
///
/// # Safety
///
/// See child function calls.
///
/// # Note
///
/// Using atomics here relieves us from needing to use `unsafe` for the static variable.
///
/// On `AArch64`, which is the only implemented architecture at the time of writing this,
/// [`AtomicBool::load`] and [`AtomicBool::store`] are lowered to ordinary load and store
/// instructions. They are therefore safe to use even with MMU + caching deactivated.
///
/// [`AtomicBool::load`]: core::sync::atomic::AtomicBool::load
/// [`AtomicBool::store`]: core::sync::atomic::AtomicBool::store
pub unsafe fn init() -> Result<(), &'static str> {
    static INIT_DONE: AtomicBool = AtomicBool::new(false);
    if INIT_DONE.load(Ordering::Relaxed) {
        return Err("Init already done");
    }

    driver_gpio()?;
    #[cfg(not(feature = "noserial"))]
    driver_uart()?;
    driver_hw_rng()?;
    driver_emmc()?;
    driver_power()?;

    INIT_DONE.store(true, Ordering::Relaxed);
    Ok(())
}

/// The SoC's EMMC (SD host) controller, backing the root FAT32 volume.
pub fn emmc() -> &'static device_driver::Emmc {
    &EMMC
}

/// A mutable view of the EMMC singleton, for satisfying `BlockDevice`'s `&mut
/// self` methods. `Emmc` only ever touches its registers from behind its own
/// internal lock, so aliasing this is safe as long as callers don't rely on
/// `&mut` for exclusion the way they would for a plain value.
///
/// # Safety
///
/// The caller must not assume this grants exclusive access; concurrent
/// callers still serialize through `Emmc`'s internal lock.
pub unsafe fn emmc_mut() -> &'static mut device_driver::Emmc {
    unsafe { &mut *(&EMMC as *const device_driver::Emmc as *mut device_driver::Emmc) }
}

/// The SoC's hardware random number generator, used once at boot to seed the
/// kernel-wide general-purpose PRNG.
pub fn hw_rng() -> &'static device_driver::HwRng {
    &HW_RNG
}

/// The SoC's power management block, backing `halt`/`reboot`.
pub fn power() -> &'static device_driver::Power {
    &POWER
}

/// The GPIO controller, needed alongside [`power`] to sequence a clean
/// power-off.
pub fn gpio() -> &'static device_driver::GPIO {
    &GPIO
}

/// Minimal code needed to bring up the console in QEMU (for testing only). This is often less steps
/// than on real hardware due to QEMU's abstractions.
#[cfg(test)]
pub fn qemu_bring_up_console() {
    console::register_console(&PL011_UART);
}

//--------------------------------------------------------------------------------------------------
// Global instances
//--------------------------------------------------------------------------------------------------

static MINI_UART: device_driver::MiniUart =
    unsafe { device_driver::MiniUart::new(device_driver::UART1_BASE) };
static PL011_UART: device_driver::PL011Uart =
    unsafe { device_driver::PL011Uart::new(device_driver::UART0_BASE) };
static GPIO: device_driver::GPIO = unsafe { device_driver::GPIO::new(device_driver::GPIO_BASE) };

#[cfg(feature = "rpi3")]
static INTERRUPT_CONTROLLER: device_driver::InterruptController =
    unsafe { device_driver::InterruptController::new(mmio::PERIPHERAL_IC_START) };

#[cfg(feature = "rpi4")]
static INTERRUPT_CONTROLLER: device_driver::GICv2 =
    unsafe { device_driver::GICv2::new(mmio::GICD_START, mmio::GICC_START) };

static HW_RNG: device_driver::HwRng =
    unsafe { device_driver::HwRng::new(crate::memory::Address::new(device_driver::RNG_BASE)) };
static EMMC: device_driver::Emmc =
    unsafe { device_driver::Emmc::new(crate::memory::Address::new(device_driver::EMMC_BASE)) };
static SYSTEM_TIMER: device_driver::SystemTimer = unsafe {
    device_driver::SystemTimer::new(crate::memory::Address::new(
        device_driver::SYSTEM_TIMER_BASE,
    ))
};
static POWER: device_driver::Power =
    unsafe { device_driver::Power::new(crate::memory::Address::new(device_driver::POWER_BASE)) };

/// The SoC's free-running microsecond timer, backing the preemptive scheduler tick.
pub fn system_timer() -> &'static device_driver::SystemTimer {
    &SYSTEM_TIMER
}

/// The interrupt source the scheduler's tick handler must register against.
#[cfg(feature = "rpi3")]
pub fn scheduler_irq_number() -> device_driver::IRQNumber {
    device_driver::IRQNumber::Peripheral(device_driver::PeripheralIRQ::new(
        device_driver::SCHEDULER_CHANNEL,
    ))
}

/// The interrupt source the scheduler's tick handler must register against.
///
/// The GIC SPI number the System Timer's channel 1 compare-match is wired to on
/// BCM2711 is board documentation this port does not have to hand; 97 is carried
/// over from the legacy BCM2837 peripheral-IRQ numbering used by mainline Linux's
/// `bcm2711-rpi-4-b.dts`, which keeps the same relative offsets as rpi3.
#[cfg(feature = "rpi4")]
pub fn scheduler_irq_number() -> device_driver::IRQNumber {
    device_driver::IRQNumber::new(97)
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

/// This must be called only after successful init of the Mini UART driver.
fn post_init_mini_uart() -> Result<(), &'static str> {
    console::register_console(&MINI_UART);
    crate::info!("[0] MiniUART is live!");
    Ok(())
}

/// This must be called only after successful init of the PL011 UART driver.
fn post_init_pl011_uart() -> Result<(), &'static str> {
    console::register_console(&PL011_UART);
    crate::info!("[0] UART0 is live!");
    Ok(())
}

// This must be called only after successful init of the GPIO driver.
fn post_init_gpio() -> Result<(), &'static str> {
    // device_driver::MiniUart::prepare_gpio(&GPIO);
    device_driver::PL011Uart::prepare_gpio(&GPIO);
    Ok(())
}

fn driver_uart() -> Result<(), &'static str> {
    // let uart_descriptor =
    //     drivers::DeviceDriverDescriptor::new(&MINI_UART, Some(post_init_mini_uart));
    // drivers::driver_manager().register_driver(uart_descriptor);

    let uart_descriptor =
        drivers::DeviceDriverDescriptor::new(&PL011_UART, Some(post_init_pl011_uart), None);
    drivers::driver_manager().register_driver(uart_descriptor);

    Ok(())
}

fn driver_gpio() -> Result<(), &'static str> {
    let gpio_descriptor = drivers::DeviceDriverDescriptor::new(&GPIO, Some(post_init_gpio), None);
    drivers::driver_manager().register_driver(gpio_descriptor);

    Ok(())
}

fn driver_hw_rng() -> Result<(), &'static str> {
    let descriptor = drivers::DeviceDriverDescriptor::new(&HW_RNG, None, None);
    drivers::driver_manager().register_driver(descriptor);

    Ok(())
}

fn driver_emmc() -> Result<(), &'static str> {
    let descriptor = drivers::DeviceDriverDescriptor::new(&EMMC, None, None);
    drivers::driver_manager().register_driver(descriptor);

    Ok(())
}

fn driver_power() -> Result<(), &'static str> {
    let descriptor = drivers::DeviceDriverDescriptor::new(&POWER, None, None);
    drivers::driver_manager().register_driver(descriptor);

    Ok(())
}
