/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Shared kernel services with no hardware dependency of their own.

pub mod logger;
pub mod murmur_hash;
pub mod rng;
