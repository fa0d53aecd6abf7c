//! Test utilities and helpers for Canopy

pub mod fixtures;

pub use fixtures::*;
