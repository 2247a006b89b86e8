/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Context switch assembly: a 13-word voluntary-switch context (callee-saved
//! x19-x28, frame pointer, stack pointer, link register) distinct from the
//! 34-word full CPU state saved at the top of every task stack for IRQ
//! entry/exit and user-space transitions. Save/restore-pair convention
//! follows the naked two-base-register style of a preemptive-threads
//! reference implementation, adapted to this kernel's narrower voluntary
//! context.

#[cfg(target_arch = "aarch64")]
use super::scheduler;
#[cfg(target_arch = "aarch64")]
use aarch64_cpu::registers::{ELR_EL1, SP_EL0, SPSR_EL1};
#[cfg(target_arch = "aarch64")]
use core::arch::asm;
#[cfg(target_arch = "aarch64")]
use tock_registers::interfaces::Writeable;

/// Callee-saved registers plus fp/sp/lr, saved on a voluntary `switch`.
/// Field order is load-bearing: `switch`'s inline asm indexes these by byte
/// offset, not by name.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Context {
    pub x19: u64,
    pub x20: u64,
    pub x21: u64,
    pub x22: u64,
    pub x23: u64,
    pub x24: u64,
    pub x25: u64,
    pub x26: u64,
    pub x27: u64,
    pub x28: u64,
    pub fp: u64,
    pub lr: u64,
    pub sp: u64,
}

impl Context {
    pub const fn new() -> Self {
        Self {
            x19: 0,
            x20: 0,
            x21: 0,
            x22: 0,
            x23: 0,
            x24: 0,
            x25: 0,
            x26: 0,
            x27: 0,
            x28: 0,
            fp: 0,
            lr: 0,
            sp: 0,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// The full architectural state saved at the top of a task's stack on every
/// IRQ entry and on transition to/from user space: all 31 general-purpose
/// registers plus sp, pc and pstate.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FullCpuState {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64,
}

impl FullCpuState {
    pub const fn new() -> Self {
        Self {
            regs: [0; 31],
            sp: 0,
            pc: 0,
            pstate: 0,
        }
    }
}

impl Default for FullCpuState {
    fn default() -> Self {
        Self::new()
    }
}

/// PSTATE value for EL1 with SP_EL1, used by kernel tasks.
pub const PSTATE_EL1H: u64 = 0x3c5;
/// PSTATE value for EL0 with SP_EL0, used by `move_to_user_space`.
pub const PSTATE_EL0T: u64 = 0x0;

/// Architecture-native voluntary context switch. Saves callee-saved
/// registers, frame pointer, stack pointer and return address into `prev`,
/// loads the same from `next`, then returns by normal procedure return into
/// the new task (or, for a never-before-run task, into
/// `return_from_fork_trampoline`).
///
/// # Safety
/// `prev` and `next` must point to live `Context`s belonging to tasks whose
/// stacks remain valid for the lifetime of the switch.
#[cfg(target_arch = "aarch64")]
#[inline(never)]
pub unsafe fn switch(prev: *mut Context, next: *const Context) {
    unsafe {
        asm!(
            "str x30, [{prev}, #88]",
            "stp x19, x20, [{prev}, #0]",
            "stp x21, x22, [{prev}, #16]",
            "stp x23, x24, [{prev}, #32]",
            "stp x25, x26, [{prev}, #48]",
            "stp x27, x28, [{prev}, #64]",
            "str x29, [{prev}, #80]",
            "mov x9, sp",
            "str x9, [{prev}, #96]",

            "ldp x19, x20, [{next}, #0]",
            "ldp x21, x22, [{next}, #16]",
            "ldp x23, x24, [{next}, #32]",
            "ldp x25, x26, [{next}, #48]",
            "ldp x27, x28, [{next}, #64]",
            "ldr x29, [{next}, #80]",
            "ldr x9, [{next}, #96]",
            "mov sp, x9",
            "ldr x30, [{next}, #88]",
            "ret",

            prev = in(reg) prev,
            next = in(reg) next,
            out("x9") _,
            options(noreturn),
        );
    }
}

/// Entry point for a task that has never been scheduled before. Reached via
/// `switch`'s final `ret` loading this address from the new task's `lr`, with
/// `x19`/`x20` still holding the wrapper function pointer and its argument
/// (loaded by that same `switch`). Re-enables preemption, then calls the
/// wrapper, which for a kernel task runs directly and for a user task first
/// calls `move_to_user_space`.
#[cfg(target_arch = "aarch64")]
#[no_mangle]
pub unsafe extern "C" fn return_from_fork_trampoline() -> ! {
    let wrapper: u64;
    let arg: u64;
    unsafe {
        asm!(
            "mov {wrapper}, x19",
            "mov {arg}, x20",
            wrapper = out(reg) wrapper,
            arg = out(reg) arg,
            options(nomem, nostack, preserves_flags),
        );
    }

    scheduler::on_fork_entry();

    let wrapper: extern "C" fn(u64) -> ! = unsafe { core::mem::transmute(wrapper as usize) };
    wrapper(arg)
}

/// Loads `SPSR_EL1`/`ELR_EL1`/`SP_EL0` from `state`, restores all 31
/// general-purpose registers from `state.regs` and `eret`s. Used both by
/// `move_to_user_space` and by `return_from_clone_trampoline`, which finds a
/// `FullCpuState` sitting at the current stack pointer (`switch` having just
/// loaded it from the cloned child's `ctx.sp`).
///
/// `x9` carries the state pointer through the restore sequence; its own
/// saved value is loaded last, from itself, so it is never needed again
/// after being overwritten.
///
/// # Safety
/// `state` must point to a fully populated, live `FullCpuState` describing a
/// valid EL0 (or EL1) entry: `pstate` a legal `SPSR_EL1` encoding, `pc` a
/// mapped, executable address, `sp` a valid stack pointer for that mode.
#[cfg(target_arch = "aarch64")]
#[inline(never)]
pub unsafe fn restore_full_state_and_eret(state: *const FullCpuState) -> ! {
    unsafe {
        let s = &*state;
        SPSR_EL1.set(s.pstate);
        ELR_EL1.set(s.pc);
        SP_EL0.set(s.sp);

        asm!(
            "ldp x0, x1,   [x9, #0]",
            "ldp x2, x3,   [x9, #16]",
            "ldp x4, x5,   [x9, #32]",
            "ldp x6, x7,   [x9, #48]",
            "ldp x10, x11, [x9, #80]",
            "ldp x12, x13, [x9, #96]",
            "ldp x14, x15, [x9, #112]",
            "ldp x16, x17, [x9, #128]",
            "ldp x18, x19, [x9, #144]",
            "ldp x20, x21, [x9, #160]",
            "ldp x22, x23, [x9, #176]",
            "ldp x24, x25, [x9, #192]",
            "ldp x26, x27, [x9, #208]",
            "ldp x28, x29, [x9, #224]",
            "ldr x30,      [x9, #240]",
            "ldr x8,       [x9, #64]",
            "ldr x9,       [x9, #72]",
            "eret",
            in("x9") state,
            options(noreturn),
        );
    }
}

/// Constructs a fresh EL0 register file — argument in `x0`, user stack in
/// `sp`, entry point in `pc` — and `eret`s into it. Called by a user task's
/// wrapper as its first action; never returns.
///
/// # Safety
/// `pc` must be a valid entry point and `sp` a valid, unused stack top for
/// the task that calls this.
#[cfg(target_arch = "aarch64")]
pub unsafe fn move_to_user_space(pc: u64, sp: u64, arg: u64) -> ! {
    let mut state = FullCpuState::new();
    state.regs[0] = arg;
    state.sp = sp;
    state.pc = pc;
    state.pstate = PSTATE_EL0T;
    unsafe { restore_full_state_and_eret(&state) }
}

/// Entry point for a task scheduled for the first time after `sys_clone`:
/// `switch` has just loaded the child's `ctx`, whose `sp` points at the
/// `FullCpuState` `clone_task` wrote to the top of the child's stack. Restores
/// it and `eret`s, diverging into the child's copy of the parent's EL0
/// execution with `x0` holding `CLONE_NEW_TASK_SENTINEL`.
#[cfg(target_arch = "aarch64")]
#[no_mangle]
pub unsafe extern "C" fn return_from_clone_trampoline() -> ! {
    scheduler::on_fork_entry();

    let state_addr: u64;
    unsafe {
        asm!("mov {sp}, sp", sp = out(reg) state_addr, options(nomem, nostack, preserves_flags));
    }
    unsafe { restore_full_state_and_eret(state_addr as *const FullCpuState) }
}
