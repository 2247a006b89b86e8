// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! BCM driver top level.

pub mod emmc;
pub mod gpio;
pub mod hw_rng;
#[cfg(feature = "rpi3")]
pub mod interrupt_controller;
pub mod mini_uart;
pub mod pl011_uart;
pub mod power;
pub mod system_timer;

#[cfg(feature = "rpi3")]
pub use interrupt_controller::*;
pub use {emmc::*, gpio::*, hw_rng::*, mini_uart::*, pl011_uart::*, power::*, system_timer::*};
