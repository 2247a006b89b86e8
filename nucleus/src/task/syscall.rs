/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! The kernel-side half of the system-call trampoline (C9): a `{write,
//! malloc, clone, exit}` table dispatched from `machine`'s EL0-synchronous
//! exception handler. `clone` marshals `{name, entry, arg, stack}` out of the
//! caller's registers and writes the child's uuid through a caller-supplied
//! result slot before returning.

use super::context::FullCpuState;
use super::scheduler::TASKS;
use crate::registry::Uuid;
use machine::exception::syscall::{register_handler, ENOSYS};

pub const SYS_WRITE: u64 = 1;
pub const SYS_MALLOC: u64 = 2;
pub const SYS_CLONE: u64 = 3;
pub const SYS_EXIT: u64 = 4;

/// Result codes written back into `x0`.
pub const OK: u64 = 0;
pub const EFAULT: u64 = 1;
pub const ENOMEM: u64 = 2;

/// Register the kernel's syscall table. Called once during platform init,
/// before any user task can run.
pub fn install() {
    register_handler(dispatch);
}

fn dispatch(nr: u64, args: [u64; 6]) -> [u64; 2] {
    match nr {
        SYS_WRITE => sys_write(args),
        SYS_MALLOC => sys_malloc(args),
        SYS_CLONE => sys_clone(args),
        SYS_EXIT => sys_exit(args),
        _ => [ENOSYS, 0],
    }
}

/// `write(ptr, len)`: copies `len` bytes starting at the user-space pointer
/// `ptr` out to the character console.
fn sys_write(args: [u64; 6]) -> [u64; 2] {
    let ptr = args[0] as *const u8;
    let len = args[1] as usize;

    if ptr.is_null() {
        return [EFAULT, 0];
    }

    let bytes = unsafe { core::slice::from_raw_parts(ptr, len) };
    for &b in bytes {
        machine::console::console().write_char(b as char);
    }

    [OK, len as u64]
}

/// `malloc(size)`: allocates `size` bytes from the DMA heap, returning the
/// base address (0 on exhaustion).
fn sys_malloc(args: [u64; 6]) -> [u64; 2] {
    let size = args[0] as usize;
    let ptr = crate::DMA_ALLOCATOR.lock(|heap| unsafe { heap.malloc(size) });
    if ptr.is_null() {
        [ENOMEM, 0]
    } else {
        [OK, ptr as u64]
    }
}

/// `clone(_, _, entry, arg, stack_top, uuid_out)`: spawns a child task that
/// diverges from the parent at user level, with `child.regs[0]` set to
/// `CLONE_NEW_TASK_SENTINEL` so it can tell its own return apart from the
/// parent's. The child's uuid is written to the caller-supplied
/// `uuid_out` slot as a raw 128-bit value.
fn sys_clone(args: [u64; 6]) -> [u64; 2] {
    let entry = args[2];
    let arg = args[3];
    let stack_top = args[4];
    let uuid_out = args[5] as *mut u128;

    let mut child_state = FullCpuState::new();
    child_state.pc = entry;
    child_state.regs[0] = arg;
    child_state.sp = stack_top;

    let uuid = Uuid::generate(machine::services::rng::next_u64);

    match TASKS.lock(|tasks| tasks.clone_task(&mut child_state, uuid)) {
        Ok(child_uuid) => {
            if !uuid_out.is_null() {
                unsafe { uuid_out.write(child_uuid.as_u128()) };
            }
            [OK, 0]
        }
        Err(_) => [ENOMEM, 0],
    }
}

/// `exit(code)`: marks the current task zombie and yields; the scheduler
/// never returns to a zombie, so the normal syscall return path is moot here.
fn sys_exit(args: [u64; 6]) -> [u64; 2] {
    let _code = args[0];
    #[cfg(target_arch = "aarch64")]
    TASKS.lock(|tasks| {
        tasks.exit_current();
    });
    [OK, 0]
}
