//! Lifetime policies.
//!
//! A lifetime determines how long a resolved instance lives:
//! - [`Lifetime::Singleton`]: one instance per container
//! - [`Lifetime::Scoped`]: one instance per scope (e.g., HTTP request)
//! - [`Lifetime::Transient`]: new instance every time
//!
//! # Captive dependencies
//! Only one combination is illegal: a container-wide component may never
//! hold a scope-bound one, because it would keep that instance alive past
//! the end of its scope. See [`Lifetime::can_capture`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Defines the lifetime of a component within the container.
///
/// # Examples
/// ```
/// use portico_container::lifetime::Lifetime;
///
/// assert!(!Lifetime::Singleton.can_capture(Lifetime::Scoped));
/// assert!(Lifetime::Singleton.can_capture(Lifetime::Transient));
/// assert!(Lifetime::Scoped.can_capture(Lifetime::Singleton));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// One instance shared across the entire container.
    ///
    /// Created on first resolve, lives until the container stops.
    ///
    /// # When to use
    /// - Database connection pools
    /// - Configuration objects
    /// - Adapters for external systems
    #[default]
    Singleton,

    /// One instance per scope (e.g., per HTTP request).
    ///
    /// Created on first resolve within a scope, discarded when the scope
    /// is disposed. Resolving it without a scope is an error.
    Scoped,

    /// New instance created on every resolve call. Never cached.
    Transient,
}

impl Lifetime {
    /// Returns `true` if this lifetime caches instances.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Lifetime::Singleton | Lifetime::Scoped)
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        matches!(self, Lifetime::Singleton)
    }

    #[inline]
    pub fn is_scoped(&self) -> bool {
        matches!(self, Lifetime::Scoped)
    }

    /// Whether a component with this lifetime may depend on one with
    /// `dependency`'s lifetime.
    ///
    /// Transient dependencies are fine everywhere: the consumer owns the
    /// fresh instance it was handed.
    #[inline]
    pub fn can_capture(&self, dependency: Lifetime) -> bool {
        !(self.is_singleton() && dependency.is_scoped())
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Singleton => write!(f, "Singleton"),
            Lifetime::Scoped => write!(f, "Scoped"),
            Lifetime::Transient => write!(f, "Transient"),
        }
    }
}
