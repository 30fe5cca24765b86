//! Real-time core of padmux: physical devices in, virtual controllers out.

#[macro_use]
pub mod logging;

pub mod combine;
pub mod engine;
pub mod error;
pub mod ffb;
pub mod macro_engine;
pub mod mapping;
pub mod publish;
pub mod registry;
pub mod virtual_pad;

pub use error::{Error, Result};
