//! Functions and structs that wrap the operating system services the bridge
//! relies on: files, time measurement and child processes.
mod fileio;
mod process;
mod time;

pub use fileio::*;
pub use process::*;
pub use time::*;
