//! lamzu-automator-core: LAMZU device discovery, polling rate commands, and
//! game-aware rate switching.
//!
//! The watcher samples running processes and flips the mouse between a
//! default and a game polling rate whenever a watched game starts or exits.
//! Installed Steam games can be added to the watch list with a library scan.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod locator;
pub mod notify;
pub mod process;
pub mod report_rate;
pub mod steam;
pub mod transport;
pub mod watcher;
#[cfg(target_os = "windows")]
pub mod windows;

/// LAMZU USB Vendor ID.
pub const LAMZU_VID: u16 = 0x373E;

/// LAMZU Maya X product ID.
pub const LAMZU_PID: u16 = 0x001E;

/// HID interface that accepts configuration reports.
pub const INTERFACE_NUMBER: u8 = 2;
