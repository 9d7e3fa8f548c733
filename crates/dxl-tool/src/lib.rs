//! # dxl-tool
//!
//! Host-side pieces for driving a DYNAMIXEL servo from a PC: a TOML
//! configuration file, a serial-port [`dxl_core::Transport`] and the
//! command-line surface used by the `dxl-tool` binary.

pub mod cli;
pub mod config;
pub mod serial;
