// SPDX-License-Identifier: BlueOak-1.0.0

//! User → kernel system-call trampoline (the boundary half of it; the dispatch
//! table itself lives in the kernel crate that knows about tasks).

use crate::synchronization::{interface::ReadWriteEx, InitStateLock};

/// A registered kernel handler for EL0-originated `svc` instructions.
///
/// Receives the syscall number (from `x8`) and six argument registers (`x0..x5`)
/// and returns `[result_code, value]`, written back into `x0`/`x1` before the
/// exception return.
pub type SyscallHandler = fn(u64, [u64; 6]) -> [u64; 2];

static SYSCALL_HANDLER: InitStateLock<Option<SyscallHandler>> = InitStateLock::new(None);

/// Result code used when no handler is registered yet, or the handler does not
/// recognize the syscall number.
pub const ENOSYS: u64 = u64::MAX;

/// Register the kernel's syscall dispatcher. Called once during platform init,
/// before any user task can run.
pub fn register_handler(handler: SyscallHandler) {
    SYSCALL_HANDLER.write(|h| *h = Some(handler));
}

/// Dispatch one `svc` trap to the registered handler.
pub(crate) fn dispatch(nr: u64, args: [u64; 6]) -> [u64; 2] {
    SYSCALL_HANDLER.read(|h| match h {
        Some(f) => f(nr, args),
        None => [ENOSYS, 0],
    })
}
