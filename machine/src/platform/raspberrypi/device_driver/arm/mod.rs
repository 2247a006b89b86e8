// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! ARM IP block drivers (RPi4 only: the BCM2711 replaces the legacy BCM2837
//! interrupt controller with a standard GIC-400).

mod gic;

pub use gic::*;
