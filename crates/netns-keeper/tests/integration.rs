//! Integration test entry point.
//!
//! The actual tests are organized in the `integration/` directory.
//!
//! # Running Tests
//!
//! ```bash
//! # Engine scenarios against the in-memory host (no root needed)
//! cargo test -p netns-keeper --features lab --test integration
//!
//! # Including the kernel tests
//! sudo -E cargo test -p netns-keeper --features lab --test integration
//! ```
//!
//! # Test Organization
//!
//! - `scenarios.rs` - full passes against `MemoryHost`
//! - `kernel.rs` - namespaces, moves and passes against the running kernel

#[macro_use]
#[path = "common/mod.rs"]
mod common;

#[path = "integration/scenarios.rs"]
mod scenarios;

#[path = "integration/kernel.rs"]
mod kernel;
