//! Keyboard and mouse macros for desktop windows
//!
//! This crate records global keyboard/mouse input into macro sequences bound
//! to a target window, stores them in a line-oriented text format and plays
//! them back by posting synthetic input to that window.
//!
//! All platform access goes through the [`InputBackend`] trait; use
//! [`create_backend`] for the native implementation or [`FakeBackend`] to
//! script input in tests.

#![cfg_attr(not(target_os = "windows"), allow(unused))]

pub mod backend;
pub mod error;
pub mod item;
pub mod keys;
pub mod player;
pub mod recorder;
pub mod sequence;

pub use backend::{create_backend, FakeBackend, InputBackend};
pub use error::*;
pub use item::*;
pub use keys::VirtualKey;
pub use player::*;
pub use recorder::*;
pub use sequence::MacroSequence;

#[cfg(test)]
pub(crate) fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_test_writer()
        .try_init();
}
