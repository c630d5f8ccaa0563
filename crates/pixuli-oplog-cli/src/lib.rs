//! Command-line front end for the Pixuli operation log
//!
//! Backs the log with a [`FileLogStorage`](pixuli_oplog::FileLogStorage)
//! directory so records survive between invocations.

pub mod commands;
pub mod config;
