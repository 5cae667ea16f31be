//! # Portico Support
//!
//! Shared utilities for the Portico crates.
//!
//! This crate provides:
//! - Text rendering for error messages and diagnostics
//! - Name-similarity suggestions for unresolvable dependencies

pub mod rendering;
