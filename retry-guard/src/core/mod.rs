//! Deterministic, pure logic shared by the guard.
//!
//! Core modules must be free of I/O side effects. Time enters only through the
//! [`clock::Clock`] trait so tests can drive it without sleeping.

pub mod clock;
pub mod fingerprint;
pub mod reconcile;
pub mod resource;
pub mod store;
pub mod types;
