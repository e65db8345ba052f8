//! Shared helpers for the binaries.

pub mod bootstrap;
