//! netstate CLI
//!
//! Command implementations behind `netstatectl`. Each command returns the
//! text to print so the binary only deals with output and exit codes.

pub mod commands;
