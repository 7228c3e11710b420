// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles for `mount-udisks`
//!
//! `FakeBus` stands in for the device service: scripted property bags and
//! command results, recorded calls and injectable notifications. `fixtures`
//! builds the property bags of typical UDisks2 and UDisks 1.x devices.

pub mod fake_bus;
pub mod fixtures;

pub use fake_bus::{Call, FakeBus};
