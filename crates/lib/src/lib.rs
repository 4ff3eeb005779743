//! wasmdist-lib: build and package a C program compiled to WebAssembly.
//!
//! A run goes through three components:
//! - `manifest`: sorted JSON listings of the files the web build loads at runtime
//! - `toolchain` / `pipeline`: emscripten invocation and the build state machine
//! - `dist`: the zip archive assembled from a verified build

pub mod config;
pub mod consts;
pub mod dist;
pub mod manifest;
pub mod pipeline;
pub mod toolchain;
pub mod util;
