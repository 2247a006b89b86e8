/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Platform init (C10): composes C1-C9 into the kernel's single boot-time
//! control flow. Probes the EMMC card, mounts the root FAT32 volume, seeds
//! the registry and PRNG from the hardware RNG, adopts the running context as
//! task 0, installs the syscall table, forks the CLI (C11) as an ordinary
//! kernel task plus a user-space demo task, and arms the preemptive
//! scheduler's timer tick. `kmain` itself goes on to idle; the CLI and demo
//! task only ever run once the scheduler switches to them.

use crate::config::{KernelConfig, KernelContext};
use crate::registry::{self, EntityType};
use crate::task::scheduler::TASKS;
use machine::exception::asynchronous::{interface::IRQHandler, IRQHandlerDescriptor};

#[derive(Debug, snafu::Snafu, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    #[snafu(display("a driver failed to initialize or register its irq handler"))]
    DriverInit,
    #[snafu(display("emmc card did not come ready"))]
    EmmcNotReady,
    #[snafu(display("mounted volume is not a recognizable fat32 filesystem"))]
    NotFat32,
    #[snafu(display("os entity registry is full"))]
    RegistryFull,
    #[snafu(display("task table is full"))]
    TaskTableFull,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Default priority/counter handed to the adopted boot context and to the CLI task.
const DEFAULT_PRIORITY: i32 = 5;

/// Stack for the CLI kernel task forked at the end of `init`.
const CLI_STACK_SIZE: usize = 32 * 1024;
static mut CLI_STACK: [u8; CLI_STACK_SIZE] = [0; CLI_STACK_SIZE];

/// Stack the user-demo task's `move_to_user_space` call is handed; the task
/// switches to its own stack (`task::user_demo::USER_STACK`) immediately on
/// entry, so this only needs to hold one `FullCpuState`'s worth of fork setup.
const USER_DEMO_STACK_SIZE: usize = 4 * 1024;
static mut USER_DEMO_STACK: [u8; USER_DEMO_STACK_SIZE] = [0; USER_DEMO_STACK_SIZE];

/// Parsed command line, mounted volume and other state handed out to
/// subsystems after `init` runs, in place of one global per value.
static CONTEXT: crate::sync::NullLock<KernelContext> =
    crate::sync::NullLock::new(KernelContext::new(KernelConfig::const_default()));

/// The parsed kernel command line.
pub fn config() -> KernelConfig {
    CONTEXT.lock(|ctx| *ctx.config())
}

/// The root filesystem volume, if mounting succeeded during `init`.
pub fn volume() -> Option<fat32::Volume> {
    CONTEXT.lock(|ctx| ctx.volume())
}

/// Writes back a `Volume` snapshot mutated by a file operation (the
/// free-cluster hint, chiefly), so later CLI commands pick up where it left
/// off instead of rescanning from the boot-time hint every time.
pub fn set_volume(volume: fat32::Volume) {
    CONTEXT.lock(|ctx| ctx.set_volume(volume));
}

/// Bridges the board's free-running timer tick to the scheduler: reschedules
/// the System Timer's compare channel, then lets the preemptive scheduler
/// decide whether to switch away from the interrupted task.
struct SchedulerTick;

impl IRQHandler for SchedulerTick {
    fn handle(&self) -> core::result::Result<(), &'static str> {
        let timer = machine::platform::drivers::system_timer();
        let channel = machine::platform::device_driver::SCHEDULER_CHANNEL;
        machine::platform::device_driver::SystemTimerIRQHandler::new(timer, channel).handle()?;
        TASKS.lock(|tasks| tasks.preemptive_schedule());
        Ok(())
    }
}

static SCHEDULER_TICK: SchedulerTick = SchedulerTick;

/// Runs once, before any user task executes. Not reentrant.
///
/// # Safety
/// Must be called exactly once, early in `kmain`, before interrupts are
/// unmasked and before any task other than the calling (boot) context exists.
pub unsafe fn init() -> Result<()> {
    unsafe {
        machine::exception::handling_init();
        machine::platform::drivers::init().map_err(|_| Error::DriverInit)?;
        machine::drivers::driver_manager().init_drivers_and_irqs();
    }

    // No DTB `/chosen/bootargs` parser exists yet, so `KernelConfig` keeps its
    // compiled-in defaults; `KernelConfig::parse` is ready for a real command
    // line once firmware hand-off is wired up.
    let _ = machine::services::logger::init(config().log_level());

    machine::services::rng::seed(machine::platform::drivers::hw_rng().next_u64());

    registry::registry().lock(|r| r.seed_hashes(machine::services::rng::next_u64()));

    registry::registry()
        .lock(|r| {
            r.add_entity(
                EntityType::HwRng,
                true,
                "bcm-hw-rng",
                "rng0",
                machine::services::rng::next_u64,
            )
        })
        .map_err(|_| Error::RegistryFull)?;

    registry::registry()
        .lock(|r| {
            r.add_entity(
                EntityType::SwRng,
                true,
                "xoroshiro128++",
                "rng1",
                machine::services::rng::next_u64,
            )
        })
        .map_err(|_| Error::RegistryFull)?;

    registry::registry()
        .lock(|r| {
            r.add_entity(
                EntityType::CharacterDevice,
                true,
                "console",
                "con0",
                machine::services::rng::next_u64,
            )
        })
        .map_err(|_| Error::RegistryFull)?;

    let emmc = unsafe { machine::platform::drivers::emmc_mut() };
    emmc.initialize().map_err(|_| Error::EmmcNotReady)?;
    log::info!("emmc0 ready");

    registry::registry()
        .lock(|r| {
            r.add_entity(
                EntityType::BlockDevice,
                true,
                "emmc0",
                "sdcard",
                machine::services::rng::next_u64,
            )
        })
        .map_err(|_| Error::RegistryFull)?;

    let mounted = fat32::Volume::mount(emmc).map_err(|_| Error::NotFat32)?;
    CONTEXT.lock(|ctx| ctx.set_volume(mounted));
    log::info!("fat0 mounted, root cluster {}", mounted.root_cluster);

    registry::registry()
        .lock(|r| {
            r.add_entity(
                EntityType::Filesystem,
                true,
                "fat0",
                "disk",
                machine::services::rng::next_u64,
            )
        })
        .map_err(|_| Error::RegistryFull)?;

    registry::registry()
        .lock(|r| {
            r.add_entity(
                EntityType::MemoryManager,
                true,
                "frame-allocator",
                "mm0",
                machine::services::rng::next_u64,
            )
        })
        .map_err(|_| Error::RegistryFull)?;

    let task_manager_uuid = registry::registry()
        .lock(|r| {
            r.add_entity(
                EntityType::TaskManager,
                true,
                "scheduler",
                "sched0",
                machine::services::rng::next_u64,
            )
        })
        .map_err(|_| Error::RegistryFull)?;

    TASKS.lock(|tasks| tasks.adopt_running_context(task_manager_uuid, DEFAULT_PRIORITY));

    crate::task::syscall::install();

    let cli_uuid = registry::registry()
        .lock(|r| {
            r.add_entity(
                EntityType::UserInterface,
                true,
                "cli",
                "shell",
                machine::services::rng::next_u64,
            )
        })
        .map_err(|_| Error::RegistryFull)?;

    #[allow(static_mut_refs)]
    let stack_top = unsafe { CLI_STACK.as_mut_ptr() as usize + CLI_STACK_SIZE };
    TASKS
        .lock(|tasks| tasks.fork_kernel_task("cli", crate::cli::task_entry, 0, stack_top, cli_uuid))
        .map_err(|_| Error::TaskTableFull)?;

    let user_demo_uuid = registry::registry()
        .lock(|r| {
            r.add_entity(
                EntityType::UserInterface,
                true,
                "user-demo",
                "user0",
                machine::services::rng::next_u64,
            )
        })
        .map_err(|_| Error::RegistryFull)?;

    #[allow(static_mut_refs)]
    let user_demo_stack_top =
        unsafe { USER_DEMO_STACK.as_mut_ptr() as usize + USER_DEMO_STACK_SIZE };
    TASKS
        .lock(|tasks| {
            tasks.fork_user_task(
                "user-demo",
                crate::task::user_demo::task_entry,
                0,
                user_demo_stack_top,
                user_demo_uuid,
            )
        })
        .map_err(|_| Error::TaskTableFull)?;

    let irq_number = machine::platform::drivers::scheduler_irq_number();
    let descriptor =
        IRQHandlerDescriptor::new_scheduler(irq_number, "scheduler tick", &SCHEDULER_TICK);
    machine::exception::asynchronous::irq_manager()
        .register_handler(descriptor)
        .map_err(|_| Error::DriverInit)?;
    machine::exception::asynchronous::irq_manager().enable(&irq_number);

    machine::platform::drivers::system_timer()
        .start_recurring(machine::platform::device_driver::SCHEDULER_CHANNEL, 10_000);

    log::info!("platform init complete, cli task forked");

    Ok(())
}
