//! Library target for the `streamfetch` package.
//!
//! The primary deliverable of this package is the `streamfetch` CLI binary
//! (`src/main.rs`). This library exists so CI can run `cargo test -p streamfetch --doc`
//! for feature/doctype validation.

#[doc(hidden)]
pub use streamfetch_engine;
