/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! A minimal EL0 task, forked once at boot to prove `fork_user_task` and
//! `move_to_user_space` actually reach user space: it issues a raw `svc`
//! through `vesper_user::syscall` to print a line, then exits.

use super::syscall::{SYS_EXIT, SYS_WRITE};

const USER_STACK_SIZE: usize = 16 * 1024;
static mut USER_STACK: [u8; USER_STACK_SIZE] = [0; USER_STACK_SIZE];

const GREETING: &str = "hello from user space\n";

/// Runs at EL0. Writes `GREETING` through the `SYS_WRITE` syscall, then exits
/// via `SYS_EXIT`; `vesper_user::syscall` carries no notion of `nucleus`'s
/// own syscall table, so the raw numbers are passed straight through.
extern "C" fn user_main(_arg: u64) -> ! {
    let ptr = GREETING.as_ptr() as u64;
    let len = GREETING.len() as u64;
    vesper_user::syscall(SYS_WRITE, [ptr, len, 0, 0, 0, 0]);
    vesper_user::syscall(SYS_EXIT, [0, 0, 0, 0, 0, 0]);
    loop {}
}

/// Forked by `fork_user_task`: its first action must be dropping to EL0, per
/// that function's contract.
pub extern "C" fn task_entry(arg: u64) -> ! {
    #[allow(static_mut_refs)]
    let stack_top = unsafe { USER_STACK.as_mut_ptr() as usize + USER_STACK_SIZE };
    unsafe { super::context::move_to_user_space(user_main as usize as u64, stack_top as u64, arg) }
}
