//! CLI command implementations.

pub mod check;
pub mod common;
pub mod kinds;
pub mod render;
pub mod tone;
