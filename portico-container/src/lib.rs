//! Core engine for Portico DI.
//!
//! - [`registry`] stores registrations keyed by contract
//! - [`graph`] validates the active registrations and orders lifecycle components
//! - [`resolver`] turns a contract into an instance, caching per lifetime
//! - [`scope`] provides flat, per-unit-of-work resolution contexts
//! - [`lifecycle`] runs `initialize`/`dispose` in dependency order

pub mod config;
pub mod container;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod key;
pub mod lifecycle;
pub mod lifetime;
pub mod profile;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod scope;

pub use async_trait::async_trait;
pub use container::{Container, ContainerBuilder, prelude};
pub use error::{PorticoError, Result};
pub use key::TypeKey;
pub use scope::Scope;
