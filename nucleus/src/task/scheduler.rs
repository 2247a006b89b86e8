/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! The counter/priority scheduler: task table, `schedule()`, the preemptive
//! tick, voluntary yield, fork/clone/exit, and task enumeration.

use super::{
    context::{Context, FullCpuState},
    Error, Result, Task, TaskName, TaskState, TaskType, Visit, CLONE_NEW_TASK_SENTINEL, MAX_TASKS,
};
use crate::registry::Uuid;
use crate::sync::NullLock;

/// The scheduling-relevant subset of a task's state, decoupled from its
/// context/stack so the selection algorithm can be exercised without real
/// hardware.
#[derive(Clone, Copy)]
pub(crate) struct SchedEntry {
    pub state: TaskState,
    pub counter: i32,
    pub priority: i32,
}

/// Select the task with the maximum `counter` among `{starting, running}`
/// tasks; if the maximum is `<= 0`, age every entry's counter as
/// `counter = (counter >> 1) + priority` and repeat. Returns `None` if no
/// task is runnable.
pub(crate) fn select_and_age(entries: &mut [Option<SchedEntry>]) -> Option<usize> {
    loop {
        let best = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, *e)))
            .filter(|(_, e)| matches!(e.state, TaskState::Starting | TaskState::Running))
            .max_by_key(|(_, e)| e.counter);

        let (index, entry) = match best {
            Some(pair) => pair,
            None => return None,
        };

        if entry.counter > 0 {
            return Some(index);
        }

        for slot in entries.iter_mut().flatten() {
            slot.counter = (slot.counter >> 1) + slot.priority;
        }
    }
}

/// The fixed-capacity task table. One instance lives kernel-wide, guarded by
/// `TASKS`.
pub struct TaskTable {
    tasks: [Option<Task>; MAX_TASKS],
    current: Option<usize>,
}

impl TaskTable {
    pub const fn new() -> Self {
        const NONE: Option<Task> = None;
        Self {
            tasks: [NONE; MAX_TASKS],
            current: None,
        }
    }

    fn sched_entries(&self) -> [Option<SchedEntry>; MAX_TASKS] {
        let mut out = [None; MAX_TASKS];
        for (i, t) in self.tasks.iter().enumerate() {
            out[i] = t.as_ref().map(|t| SchedEntry {
                state: t.state,
                counter: t.counter,
                priority: t.priority,
            });
        }
        out
    }

    /// Adopt the currently running (boot) context as task 0, so the thread
    /// that called into the kernel has a `Task` the scheduler can switch
    /// away from. Must be called exactly once, before any `fork`.
    pub fn adopt_running_context(&mut self, uuid: Uuid, priority: i32) -> usize {
        self.tasks[0] = Some(Task {
            uuid,
            name: TaskName::new("init"),
            task_type: TaskType::Kernel,
            state: TaskState::Running,
            counter: priority,
            priority,
            preempt_count: 0,
            stack_base: 0,
            ctx: Context::new(),
        });
        self.current = Some(0);
        0
    }

    fn free_slot(&self) -> Result<usize> {
        self.tasks
            .iter()
            .position(Option::is_none)
            .ok_or(Error::TableFull)
    }

    /// Iterate tasks in table order, stopping early if `visitor` returns
    /// `Visit::Finished`.
    pub fn visit_tasks(&self, mut visitor: impl FnMut(&Task) -> Visit) {
        for task in self.tasks.iter().flatten() {
            if let Visit::Finished = visitor(task) {
                break;
            }
        }
    }

    pub fn get(&self, uuid: Uuid) -> Result<&Task> {
        self.tasks
            .iter()
            .flatten()
            .find(|t| t.uuid == uuid)
            .ok_or(Error::NoSuchTask)
    }

    /// Sets `counter = 0` on the current task, then reschedules.
    #[cfg(target_arch = "aarch64")]
    pub fn yield_now(&mut self) {
        if let Some(current) = self.current {
            if let Some(task) = self.tasks[current].as_mut() {
                task.counter = 0;
            }
        }
        self.schedule();
    }

    #[cfg(target_arch = "aarch64")]
    pub fn schedule(&mut self) {
        let current = match self.current {
            Some(i) => i,
            None => return,
        };
        self.tasks[current].as_mut().unwrap().preempt_count += 1;

        let mut entries = self.sched_entries();
        let next = select_and_age(&mut entries);
        for (i, e) in entries.iter().enumerate() {
            if let (Some(task), Some(entry)) = (self.tasks[i].as_mut(), e) {
                task.counter = entry.counter;
            }
        }

        if let Some(next_index) = next {
            if next_index != current {
                self.tasks[next_index].as_mut().unwrap().state = TaskState::Running;
                self.current = Some(next_index);

                let prev_ctx: *mut Context = &mut self.tasks[current].as_mut().unwrap().ctx;
                let next_ctx: *const Context = &self.tasks[next_index].as_ref().unwrap().ctx;

                // The outgoing task is switched away from here and, if zombie,
                // never scheduled again: its slot is reclaimed now, in its own
                // still-running flow, rather than waiting on a resume that a
                // zombie task will never get.
                if self.tasks[current].as_ref().unwrap().state == TaskState::Zombie {
                    let uuid = self.tasks[current].as_ref().unwrap().uuid;
                    let _ = self.reap(uuid);
                }

                unsafe { super::context::switch(prev_ctx, next_ctx) };
            }
        }

        if let Some(resumed) = self.current {
            if let Some(task) = self.tasks[resumed].as_mut() {
                task.preempt_count -= 1;
            }
        }
    }

    /// Invoked from the timer-1 ISR. Decrements the current task's counter;
    /// if it is still positive, or preemption is disabled, returns without
    /// rescheduling.
    #[cfg(target_arch = "aarch64")]
    pub fn preemptive_schedule(&mut self) {
        let current = match self.current {
            Some(i) => i,
            None => return,
        };
        let task = self.tasks[current].as_mut().unwrap();
        task.counter -= 1;
        if task.counter > 0 || task.preempt_count > 0 {
            return;
        }

        unsafe { enable_irqs() };
        self.schedule();
        unsafe { disable_irqs() };
    }

    fn fork_common(
        &mut self,
        task_type: TaskType,
        name: &str,
        wrapper: extern "C" fn(u64) -> !,
        arg: u64,
        stack_top: usize,
        uuid: Uuid,
    ) -> Result<Uuid> {
        let current_priority = self
            .current
            .and_then(|i| self.tasks[i].as_ref())
            .map(|t| t.priority)
            .unwrap_or(1);

        let slot = self.free_slot()?;

        let full_state_addr = stack_top - core::mem::size_of::<FullCpuState>();

        let mut ctx = Context::new();
        ctx.x19 = wrapper as usize as u64;
        ctx.x20 = arg;
        ctx.sp = full_state_addr as u64;
        #[cfg(target_arch = "aarch64")]
        {
            ctx.lr = super::context::return_from_fork_trampoline as usize as u64;
        }

        self.tasks[slot] = Some(Task {
            uuid,
            name: TaskName::new(name),
            task_type,
            state: TaskState::Starting,
            counter: current_priority,
            priority: current_priority,
            preempt_count: 1,
            stack_base: stack_top,
            ctx,
        });

        Ok(uuid)
    }

    /// Fork a kernel task: `wrapper` runs directly in kernel mode.
    pub fn fork_kernel_task(
        &mut self,
        name: &str,
        wrapper: extern "C" fn(u64) -> !,
        arg: u64,
        stack_top: usize,
        uuid: Uuid,
    ) -> Result<Uuid> {
        self.fork_common(TaskType::Kernel, name, wrapper, arg, stack_top, uuid)
    }

    /// Fork a user task: `wrapper` is expected to call `move_to_user_space`
    /// as its first action.
    pub fn fork_user_task(
        &mut self,
        name: &str,
        wrapper: extern "C" fn(u64) -> !,
        arg: u64,
        stack_top: usize,
        uuid: Uuid,
    ) -> Result<Uuid> {
        self.fork_common(TaskType::User, name, wrapper, arg, stack_top, uuid)
    }

    /// Copy the caller's full CPU state into a fresh task for
    /// `sys_clone`, marking the child's `x0` with a sentinel so it can tell
    /// its return from the syscall apart from the parent's. `child_state.sp`
    /// must already hold the top of the stack `sys_clone`'s caller handed in
    /// for the child; the top `size_of::<FullCpuState>()` bytes of it are
    /// reserved to hold the saved register file `return_from_clone_trampoline`
    /// restores on the child's first dispatch, mirroring `fork_common`'s
    /// `full_state_addr` convention.
    pub fn clone_task(&mut self, child_state: &mut FullCpuState, uuid: Uuid) -> Result<Uuid> {
        child_state.regs[0] = CLONE_NEW_TASK_SENTINEL;

        let current = self.current.ok_or(Error::NoSuchTask)?;
        let parent = self.tasks[current].as_ref().ok_or(Error::NoSuchTask)?;

        let slot = self.free_slot()?;

        let stack_top = child_state.sp as usize;
        let full_state_addr = stack_top - core::mem::size_of::<FullCpuState>();
        child_state.sp = full_state_addr as u64;
        unsafe { core::ptr::write(full_state_addr as *mut FullCpuState, *child_state) };

        let mut ctx = Context::new();
        ctx.sp = full_state_addr as u64;
        #[cfg(target_arch = "aarch64")]
        {
            ctx.lr = super::context::return_from_clone_trampoline as usize as u64;
        }

        self.tasks[slot] = Some(Task {
            uuid,
            name: TaskName::new(parent.name()),
            task_type: TaskType::User,
            state: TaskState::Starting,
            counter: parent.priority,
            priority: parent.priority,
            preempt_count: 1,
            stack_base: stack_top,
            ctx,
        });
        Ok(uuid)
    }

    /// Disables preemption, marks the current task zombie, releases its
    /// stack (the caller does the actual page release since that needs the
    /// memory manager), re-enables preemption and yields. The scheduler
    /// never selects a zombie task again; `schedule()` reaps this task's
    /// slot itself as it switches away, so this call never returns.
    #[cfg(target_arch = "aarch64")]
    pub fn exit_current(&mut self) -> Option<usize> {
        let current = self.current?;
        let stack_base = {
            let task = self.tasks[current].as_mut().unwrap();
            task.preempt_count += 1;
            task.state = TaskState::Zombie;
            task.stack_base
        };
        self.tasks[current].as_mut().unwrap().preempt_count -= 1;
        self.yield_now();
        Some(stack_base)
    }

    /// Drop a zombie task's table slot once its stack has been released.
    pub fn reap(&mut self, uuid: Uuid) -> Result<()> {
        let index = self
            .tasks
            .iter()
            .position(|t| matches!(t, Some(t) if t.uuid == uuid && t.state == TaskState::Zombie))
            .ok_or(Error::NoSuchTask)?;
        self.tasks[index] = None;
        Ok(())
    }
}

/// Called from `return_from_fork_trampoline` on a task's first dispatch:
/// undoes the `preempt_count = 1` set by `fork_common`.
pub fn on_fork_entry() {
    TASKS.lock(|tasks| {
        if let Some(current) = tasks.current {
            if let Some(task) = tasks.tasks[current].as_mut() {
                task.preempt_count -= 1;
            }
        }
    });
}

#[cfg(target_arch = "aarch64")]
unsafe fn enable_irqs() {
    unsafe { core::arch::asm!("msr daifclr, #2", options(nomem, nostack)) };
}

#[cfg(target_arch = "aarch64")]
unsafe fn disable_irqs() {
    unsafe { core::arch::asm!("msr daifset, #2", options(nomem, nostack)) };
}

/// The kernel-wide task table.
pub static TASKS: NullLock<TaskTable> = NullLock::new(TaskTable::new());

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(state: TaskState, counter: i32, priority: i32) -> Option<SchedEntry> {
        Some(SchedEntry {
            state,
            counter,
            priority,
        })
    }

    #[test]
    fn picks_the_highest_counter_among_runnable_tasks() {
        let mut entries = [
            entry(TaskState::Running, 3, 1),
            entry(TaskState::Running, 7, 1),
            entry(TaskState::Starting, 5, 1),
        ];
        assert_eq!(select_and_age(&mut entries), Some(1));
    }

    #[test]
    fn zombies_are_never_selected() {
        let mut entries = [entry(TaskState::Zombie, 99, 1), entry(TaskState::Running, 1, 1)];
        assert_eq!(select_and_age(&mut entries), Some(1));
    }

    #[test]
    fn ages_every_counter_when_all_are_non_positive() {
        let mut entries = [
            entry(TaskState::Running, 0, 4),
            entry(TaskState::Running, -2, 2),
        ];
        // task 0 ages to (0>>1)+4=4, task 1 to (-2>>1)+2=1; task 0 wins.
        assert_eq!(select_and_age(&mut entries), Some(0));
        assert_eq!(entries[0].unwrap().counter, 4);
        assert_eq!(entries[1].unwrap().counter, 1);
    }

    #[test]
    fn empty_table_selects_nothing() {
        let mut entries: [Option<SchedEntry>; 0] = [];
        assert_eq!(select_and_age(&mut entries), None);
    }

    #[test]
    fn only_entry_present_is_selected_after_one_aging_round() {
        let mut entries = [entry(TaskState::Running, 0, 1)];
        assert_eq!(select_and_age(&mut entries), Some(0));
    }
}
