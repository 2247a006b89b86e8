/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

mod asid;
mod phys_addr;
mod virt_addr;

pub use asid::*;
pub use phys_addr::*;
pub use virt_addr::*;
