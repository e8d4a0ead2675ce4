pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod fetch;
pub mod listener;
pub mod logger;
pub mod page;
pub mod redraw;
pub mod utils;
pub mod vote;

#[cfg(test)]
mod testutils;

pub use error::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
