//! pyro-rootfs library exports.
//!
//! The binary is a thin CLI over these modules; integration tests drive the
//! composer and exporter directly.

pub mod commands;
pub mod common;
pub mod compose;
pub mod config;
pub mod elf;
pub mod error;
pub mod export;
pub mod identity;
pub mod layout;
pub mod preflight;
pub mod process;
pub mod timing;
pub mod verify;
