//! Pixel tracking CLI library.
//!
//! This crate provides the command-line interface over the attribution engine.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, PixelArgs, WindowArgs};
pub use config::Config;
