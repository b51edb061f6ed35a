//! Small shared building blocks used by `machina-core`.
//!
//! Kept as its own crate the way the ancestor kernel kept a `utils` crate
//! alongside its main `os` crate: generic enough to have no dependency on
//! device/bus types, reused by the core without pulling the core in.

pub mod handle;

pub use handle::{Handle, HandleRef};
