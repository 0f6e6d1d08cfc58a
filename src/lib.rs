// SPDX-License-Identifier: GPL-3.0-only
//! Brightness keys from ACPI video notifications
//!
//! Laptop firmware reports the brightness hotkeys as ACPI notifications on
//! the panel's output device instead of as key presses. This crate finds
//! that panel, listens to it, and turns brightness up/down notifications
//! into key presses: handed to an in-process consumer if one claims them,
//! typed on a virtual keyboard otherwise.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod consumers;
pub mod error;
pub mod keyboard;
pub mod panel;
pub mod registry;
pub mod router;
pub mod service;
pub mod source;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use service::BrightnessKeys;
