/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */
pub mod block;
pub mod console;
pub mod serial;

pub use {
    block::{BlockDevice, InMemoryBlockDevice},
    console::{Console, ConsoleOps},
    serial::SerialOps,
};
