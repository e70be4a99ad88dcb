//! The `run` command: build the core, start sync and drive it from stdin.

mod commands;
mod run;
mod services;

pub use run::{run, RunOptions};
