mod error;
mod utils;

pub mod chat;
pub mod client;
pub mod config;
pub mod database;
pub mod message;
pub mod resource;
pub mod schedule;
pub mod service;

pub use error::{Error, Result};

// Use of a mod or pub mod is not actually necessary.
pub mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
