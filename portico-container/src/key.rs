//! Type identification keys.
//!
//! [`TypeKey`] identifies a resolvable contract within the container.
//! It combines a [`TypeId`] with an optional qualifier for cases where
//! one Rust type backs several distinct contracts.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use portico_support::rendering::shorten_type_name;
use serde::{Serialize, Serializer};

/// Uniquely identifies a resolvable contract in the container.
///
/// Two keys are equal iff they have the same [`TypeId`] and the same
/// qualifier. The human-readable type name only feeds diagnostics.
///
/// # Examples
/// ```
/// use portico_container::key::TypeKey;
///
/// let key = TypeKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert_eq!(key.qualifier(), None);
///
/// let key = TypeKey::qualified::<String>("database_url");
/// assert_eq!(key.qualifier(), Some("database_url"));
/// ```
#[derive(Clone)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
    qualifier: Option<&'static str>,
}

impl TypeKey {
    /// Creates a key for type `T`. `T` may be unsized (`dyn Trait`).
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            qualifier: None,
        }
    }

    /// Creates a qualified key for type `T`.
    ///
    /// ```
    /// use portico_container::key::TypeKey;
    ///
    /// let primary = TypeKey::qualified::<String>("primary_db");
    /// let replica = TypeKey::qualified::<String>("replica_db");
    /// assert_ne!(primary, replica);
    /// ```
    #[inline]
    pub fn qualified<T: ?Sized + 'static>(qualifier: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            qualifier: Some(qualifier),
        }
    }

    /// Returns the [`TypeId`] of this contract.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type name without module paths.
    pub fn short_name(&self) -> String {
        match self.qualifier {
            Some(q) => format!("{}#{q}", shorten_type_name(self.type_name)),
            None => shorten_type_name(self.type_name),
        }
    }

    #[inline]
    pub fn qualifier(&self) -> Option<&'static str> {
        self.qualifier
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.qualifier == other.qualifier
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.qualifier.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.qualifier {
            Some(q) => write!(f, "TypeKey({}, qualifier={:?})", self.type_name, q),
            None => write!(f, "TypeKey({})", self.type_name),
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.qualifier {
            Some(q) => write!(f, "{} (qualifier={:?})", self.type_name, q),
            None => write!(f, "{}", self.type_name),
        }
    }
}

impl Serialize for TypeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ledger;

    #[test]
    fn key_of_type() {
        let key = TypeKey::of::<Ledger>();
        assert!(key.type_name().contains("Ledger"));
        assert_eq!(key.short_name(), "Ledger");
        assert_eq!(key.qualifier(), None);
    }

    #[test]
    fn key_equality_same_type() {
        assert_eq!(TypeKey::of::<String>(), TypeKey::of::<String>());
    }

    #[test]
    fn key_inequality_different_types() {
        assert_ne!(TypeKey::of::<String>(), TypeKey::of::<i32>());
    }

    #[test]
    fn qualified_vs_plain_different() {
        assert_ne!(TypeKey::qualified::<String>("a"), TypeKey::of::<String>());
        assert_eq!(TypeKey::qualified::<String>("a").short_name(), "String#a");
    }

    #[test]
    fn key_in_hashmap() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(TypeKey::of::<String>(), "string");
        map.insert(TypeKey::of::<i32>(), "i32");
        assert_eq!(map.get(&TypeKey::of::<String>()), Some(&"string"));
        assert_eq!(map.get(&TypeKey::of::<bool>()), None);
    }

    #[test]
    fn trait_object_keys() {
        trait Notifier {}
        let key = TypeKey::of::<dyn Notifier>();
        assert!(key.short_name().contains("Notifier"));
    }
}
