//! End-to-end runs of the wasmdist binary against a fake compiler script.
//!
//! Tests run serially: a script still open for writing in one test can make a
//! concurrent spawn fail with ETXTBSY.

#![cfg(unix)]

mod common;
mod dist_tests;
