// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2021-2022 Andre Richter <andre.o.richter@gmail.com>

//! Kernel state management.

use core::sync::atomic::{AtomicU8, Ordering};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// The kernel's global state.
#[derive(Debug, Eq, PartialEq)]
pub enum State {
    /// The kernel is still in the init phase. Data structures populated now may be
    /// assumed race-free by everything that only runs after init completes.
    Init,
    /// The kernel has left init and is running single-core (the only mode this
    /// kernel supports; see spec Non-goals).
    SingleCoreMain,
}

struct StateManager(AtomicU8);

//--------------------------------------------------------------------------------------------------
// Global instances
//--------------------------------------------------------------------------------------------------

static STATE_MANAGER: StateManager = StateManager::new();

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl StateManager {
    const INIT: u8 = 0;
    const SINGLE_CORE_MAIN: u8 = 1;

    const fn new() -> Self {
        Self(AtomicU8::new(Self::INIT))
    }

    fn state(&self) -> State {
        match self.0.load(Ordering::Acquire) {
            Self::INIT => State::Init,
            Self::SINGLE_CORE_MAIN => State::SingleCoreMain,
            _ => unreachable!(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Return a reference to the global state manager.
pub fn state_manager() -> &'static impl StateManagerIf {
    &STATE_MANAGER
}

/// Operations exposed on the global state manager.
pub trait StateManagerIf {
    /// Whether the kernel is still in its init phase.
    fn is_init(&self) -> bool;

    /// Leave init and transition to single-core main. Must only be called once.
    fn transition_to_single_core_main(&self);
}

impl StateManagerIf for StateManager {
    fn is_init(&self) -> bool {
        self.state() == State::Init
    }

    fn transition_to_single_core_main(&self) {
        assert!(self.is_init(), "transition_to_single_core_main called twice");

        self.0.store(Self::SINGLE_CORE_MAIN, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn starts_in_init_state() {
        assert!(state_manager().is_init());
    }
}
