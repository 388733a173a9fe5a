//! Oil interval tracker CLI library.
//!
//! This crate provides the command-line and chat front ends for the tracker.

mod cli;
pub mod commands;
mod config;
pub mod render;

pub use cli::{Cli, Commands, KmArgs, PhotoArgs};
pub use config::{Config, OcrBackend};
