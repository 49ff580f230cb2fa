//! vs-cli: Command-line interface for VStation
//!
//! Provides the `vstation` CLI for talking to the daemon and for running
//! it in-process with `vstation serve`.

pub mod commands;
pub mod ipc;
pub mod output;
