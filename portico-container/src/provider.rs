//! Provider trait: a module of related registrations.
//!
//! Providers are the boundary to discovery: whatever locates components
//! (a hand-written module, a scanner, generated code) hands the engine
//! finished [`RegistrationRecord`]s through this trait. The engine never
//! walks modules itself.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use portico_container::prelude::*;
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! struct FixedClock;
//! impl Clock for FixedClock {
//!     fn now(&self) -> u64 { 42 }
//! }
//!
//! struct TimeProvider;
//!
//! impl Provider for TimeProvider {
//!     fn records(&self) -> Vec<RegistrationRecord> {
//!         vec![RegistrationRecord::binding(Binding::<dyn Clock, FixedClock>::new(
//!             |_| Ok(FixedClock),
//!             |c| c as Arc<dyn Clock>,
//!         ))]
//!     }
//! }
//!
//! let container = Container::builder().add_provider(&TimeProvider).build().unwrap();
//! assert_eq!(container.resolve::<dyn Clock>().unwrap().now(), 42);
//! ```

use crate::registry::RegistrationRecord;

/// A source of registration records.
///
/// Split registrations by domain instead of one giant block:
///
/// ```rust,ignore
/// let container = Container::builder()
///     .add_provider(&DatabaseProvider)
///     .add_provider(&NotificationProvider)
///     .build()?;
/// ```
pub trait Provider: Send + Sync {
    /// The records to register, in declaration order.
    fn records(&self) -> Vec<RegistrationRecord>;

    /// Human-readable name for logs and diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Where the records came from (module path, file, package), if known.
    fn source(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::container::Container;
    use crate::error::PorticoError;
    use crate::key::TypeKey;
    use crate::registry::Registration;

    struct SettingsProvider;

    impl Provider for SettingsProvider {
        fn records(&self) -> Vec<RegistrationRecord> {
            vec![
                RegistrationRecord::instance(8080u16),
                RegistrationRecord::new(
                    TypeKey::qualified::<String>("database_url"),
                    Registration::instance(Arc::new(String::from("postgres://localhost"))),
                ),
            ]
        }

        fn source(&self) -> Option<&str> {
            Some("settings")
        }
    }

    #[test]
    fn provider_records_are_registered() {
        let container = Container::new();
        container.add_provider(&SettingsProvider).unwrap();

        assert_eq!(*container.resolve::<u16>().unwrap(), 8080);
        let url = container
            .resolve_keyed::<String>(&TypeKey::qualified::<String>("database_url"))
            .unwrap();
        assert_eq!(url.as_str(), "postgres://localhost");
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn provider_added_twice_is_duplicate() {
        let container = Container::new();
        container.add_provider(&SettingsProvider).unwrap();
        let err = container.add_provider(&SettingsProvider).unwrap_err();
        assert!(matches!(err, PorticoError::DuplicateRegistration(_)));
    }

    #[test]
    fn default_name_is_type_name() {
        assert!(SettingsProvider.name().ends_with("SettingsProvider"));
        assert_eq!(SettingsProvider.source(), Some("settings"));
    }
}
