/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Task/scheduler (C8): fork, voluntary yield, preemptive tick, and the
//! counter/priority scheduling algorithm, with a 13-word voluntary-switch
//! context distinct from the 34-word full CPU state saved on every IRQ/user
//! entry.

pub mod context;
pub mod scheduler;
pub mod syscall;
pub mod user_demo;

use crate::registry::Uuid;

pub const MAX_TASK_NAME_LENGTH: usize = 32;
pub const MAX_TASKS: usize = 32;

/// Sentinel written into the child's saved `x0` on `clone`, so that the first
/// time the child is scheduled it can tell its return from the syscall apart
/// from the parent's.
pub const CLONE_NEW_TASK_SENTINEL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TaskType {
    Kernel,
    User,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TaskState {
    Starting,
    Running,
    Zombie,
}

#[derive(Clone, Copy)]
struct TaskName {
    buf: [u8; MAX_TASK_NAME_LENGTH],
    len: usize,
}

impl TaskName {
    fn new(s: &str) -> Self {
        let mut buf = [0u8; MAX_TASK_NAME_LENGTH];
        let len = s.len().min(MAX_TASK_NAME_LENGTH);
        buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self { buf, len }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

/// A schedulable unit of execution: either a kernel task (runs in EL1
/// throughout its life) or a user task (enters EL0 via `move_to_user_space`).
pub struct Task {
    pub uuid: Uuid,
    name: TaskName,
    pub task_type: TaskType,
    pub state: TaskState,
    pub counter: i32,
    pub priority: i32,
    pub preempt_count: u32,
    pub stack_base: usize,
    pub ctx: context::Context,
}

impl Task {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

#[derive(Debug, snafu::Snafu, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    #[snafu(display("task table is full"))]
    TableFull,
    #[snafu(display("no task with that uuid is scheduled"))]
    NoSuchTask,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Callback return used by `visit_tasks`: `finished` stops the walk early.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Visit {
    Next,
    Finished,
}
