//! Error types for Portico container operations.
//!
//! Every error carries structured context (the keys, lifetimes and
//! profiles involved) and renders a readable, actionable message.

use std::fmt;

use portico_support::rendering::{ChainEntry, render_chain, render_chain_vertical, render_set};

use crate::key::TypeKey;
use crate::lifetime::Lifetime;
use crate::profile::Profile;

/// Failure reported by user code: factories, `initialize()`, `dispose()`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all Portico operations.
#[derive(Debug, thiserror::Error)]
pub enum PorticoError {
    /// A single-binding contract was registered twice.
    #[error("{}", .0)]
    DuplicateRegistration(DuplicateRegistrationError),

    /// More than one implementation matches a contract + profile.
    #[error("{}", .0)]
    AmbiguousRegistration(AmbiguousRegistrationError),

    /// A required dependency has no matching registration.
    #[error("{}", .0)]
    UnresolvableDependency(UnresolvableDependencyError),

    /// A dependency cycle was found, statically or during resolution.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A container-wide component depends on a scope-bound one.
    #[error("{}", .0)]
    CaptiveDependency(CaptiveDependencyError),

    /// Scope rules were violated.
    #[error("{}", .0)]
    Scope(ScopeError),

    /// A component's `initialize()` failed during `start()`.
    #[error(transparent)]
    LifecycleInitialization(LifecycleInitializationError),

    /// One or more `dispose()` calls failed.
    #[error(transparent)]
    AggregateDisposal(AggregateDisposalError),

    /// A producer returned an error or a value of the wrong type.
    #[error("Failed to construct {key}: {source}")]
    ConstructionFailed {
        key: TypeKey,
        #[source]
        source: BoxError,
    },
}

impl PorticoError {
    pub(crate) fn construction(key: &TypeKey, source: impl Into<BoxError>) -> Self {
        PorticoError::ConstructionFailed {
            key: key.clone(),
            source: source.into(),
        }
    }

    /// Keeps nested resolution errors intact; wraps anything else.
    pub(crate) fn from_factory(key: &TypeKey, source: BoxError) -> Self {
        match source.downcast::<PorticoError>() {
            Ok(inner) => *inner,
            Err(other) => PorticoError::construction(key, other),
        }
    }
}

/// Why a registration was rejected as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateReason {
    /// The contract already has a registration of the given kind.
    AlreadyRegistered { existing: &'static str },
    /// Single- and multi-binding implementations were mixed on one contract.
    MixedMultiplicity,
}

/// Error when trying to register a contract that already exists.
#[derive(Debug)]
pub struct DuplicateRegistrationError {
    pub key: TypeKey,
    pub reason: DuplicateReason,
}

impl fmt::Display for DuplicateRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            DuplicateReason::AlreadyRegistered { existing } => {
                write!(f, "Duplicate registration: {} (already registered as {existing})", self.key)?;
                write!(
                    f,
                    "\n  Hint: Register each contract once, or enable allow_override in the container config"
                )
            }
            DuplicateReason::MixedMultiplicity => {
                write!(
                    f,
                    "Duplicate registration: {} has both single and multi-binding implementations",
                    self.key
                )?;
                write!(f, "\n  Hint: Mark every implementation of this contract multi, or none of them")
            }
        }
    }
}

/// Error when more than one implementation matches a contract.
#[derive(Debug)]
pub struct AmbiguousRegistrationError {
    pub contract: TypeKey,
    /// The active profile, or `None` when the container does not filter.
    pub profile: Option<Profile>,
    /// Names of the competing implementations.
    pub implementations: Vec<&'static str>,
    /// Set when a multi-binding contract was requested as a single value.
    pub multi: bool,
}

impl fmt::Display for AmbiguousRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ambiguous registration for {}", self.contract)?;
        if let Some(ref profile) = self.profile {
            write!(f, " under profile '{profile}'")?;
        }
        write!(f, ": {}", render_set(&self.implementations))?;
        if self.multi {
            write!(f, "\n  Hint: The contract is multi-binding; use resolve_all() to get every implementation")
        } else {
            write!(
                f,
                "\n  Hint: Give each implementation a distinct profile, or mark them multi"
            )
        }
    }
}

/// Error when a dependency was not registered.
#[derive(Debug)]
pub struct UnresolvableDependencyError {
    /// The contract that could not be resolved
    pub requested: TypeKey,
    /// In-progress resolution chain that led here, ending in `requested`
    pub chain: Vec<TypeKey>,
    pub profile: Option<Profile>,
    /// Similar contracts that ARE registered (for "did you mean?" hints)
    pub suggestions: Vec<String>,
}

impl UnresolvableDependencyError {
    /// The consumer that asked for the missing contract, if nested.
    pub fn required_by(&self) -> Option<&TypeKey> {
        if self.chain.len() >= 2 {
            self.chain.get(self.chain.len() - 2)
        } else {
            None
        }
    }
}

impl fmt::Display for UnresolvableDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency not registered: {}", self.requested)?;
        if let Some(ref profile) = self.profile {
            write!(f, " (profile '{profile}')")?;
        }

        if self.chain.len() > 1 {
            let names: Vec<String> = self.chain.iter().map(TypeKey::short_name).collect();
            write!(f, "\n  Resolution chain: {}", render_chain(&names))?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: Register an implementation of {} for the active profile",
            self.requested.short_name()
        )
    }
}

/// How a cycle was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDetection {
    /// Kahn's algorithm over lifecycle components left these nodes unprocessed.
    Static,
    /// The resolution-stack guard saw a contract re-entered.
    Dynamic,
}

/// Error when a circular dependency is detected.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Static: the unprocessed node set, in declaration order.
    /// Dynamic: the in-progress chain, ending with the re-entered key.
    pub cycle: Vec<TypeKey>,
    pub detection: CycleDetection,
}

impl CircularDependencyError {
    pub fn involves(&self, key: &TypeKey) -> bool {
        self.cycle.contains(key)
    }
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.cycle.iter().map(TypeKey::short_name).collect();
        match self.detection {
            CycleDetection::Static => write!(
                f,
                "Circular dependency among lifecycle components: {}",
                render_set(&names)
            )?,
            CycleDetection::Dynamic => write!(
                f,
                "Circular dependency detected while resolving:\n  {}",
                render_chain(&names)
            )?,
        }
        write!(
            f,
            "\n  Hint: Break the cycle by extracting the shared part into its own component"
        )
    }
}

/// Error when a container-wide component captures a scope-bound one.
#[derive(Debug)]
pub struct CaptiveDependencyError {
    pub consumer: TypeKey,
    pub consumer_lifetime: Lifetime,
    pub dependency: TypeKey,
    pub dependency_lifetime: Lifetime,
}

impl fmt::Display for CaptiveDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Captive dependency: {} ({}) cannot depend on {} ({})\n",
            self.consumer, self.consumer_lifetime, self.dependency, self.dependency_lifetime,
        )?;
        let chain = [
            ChainEntry::new(self.consumer.short_name(), self.consumer_lifetime.to_string()),
            ChainEntry::new(self.dependency.short_name(), self.dependency_lifetime.to_string()),
        ];
        write!(f, "{}", render_chain_vertical(&chain))?;
        write!(
            f,
            "  Hint: Make {} Scoped or Transient, or widen {} to Singleton",
            self.consumer.short_name(),
            self.dependency.short_name(),
        )
    }
}

/// What scope rule was broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeErrorKind {
    /// A scope-bound contract was resolved outside any scope.
    NoActiveScope { key: TypeKey },
    /// The scope was already disposed (resolve after dispose, or dispose twice).
    Disposed { scope_id: u64 },
    /// `create_scope` was called on a scope.
    Nested { scope_id: u64 },
}

/// Error when scope rules are violated.
#[derive(Debug)]
pub struct ScopeError {
    pub kind: ScopeErrorKind,
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ScopeErrorKind::NoActiveScope { key } => {
                write!(f, "Scope error: {key} is Scoped but no scope is active")?;
                write!(f, "\n  Hint: Resolve it through container.create_scope()")
            }
            ScopeErrorKind::Disposed { scope_id } => {
                write!(f, "Scope error: scope #{scope_id} has already been disposed")
            }
            ScopeErrorKind::Nested { scope_id } => {
                write!(f, "Scope error: cannot create a scope inside scope #{scope_id}")?;
                write!(f, "\n  Hint: Scopes are flat; create sibling scopes from the container")
            }
        }
    }
}

/// A component's `initialize()` failed; rollback already ran.
#[derive(Debug, thiserror::Error)]
#[error("Failed to initialize {component} ({implementation}): {source}")]
pub struct LifecycleInitializationError {
    pub component: TypeKey,
    pub implementation: &'static str,
    #[source]
    pub source: BoxError,
}

/// One failed `dispose()` call.
#[derive(Debug)]
pub struct DisposalFailure {
    pub component: TypeKey,
    pub implementation: &'static str,
    pub source: BoxError,
}

/// Every disposal failure from one tear-down pass.
#[derive(Debug)]
pub struct AggregateDisposalError {
    pub failures: Vec<DisposalFailure>,
}

impl fmt::Display for AggregateDisposalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} component(s) failed to dispose:", self.failures.len())?;
        for failure in &self.failures {
            write!(
                f,
                "\n  - {} ({}): {}",
                failure.component.short_name(),
                failure.implementation,
                failure.source
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateDisposalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| failure.source.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<AggregateDisposalError> for PorticoError {
    fn from(value: AggregateDisposalError) -> Self {
        PorticoError::AggregateDisposal(value)
    }
}

impl From<LifecycleInitializationError> for PorticoError {
    fn from(value: LifecycleInitializationError) -> Self {
        PorticoError::LifecycleInitialization(value)
    }
}

impl From<ScopeError> for PorticoError {
    fn from(value: ScopeError) -> Self {
        PorticoError::Scope(value)
    }
}

/// Convenient Result type for Portico operations.
pub type Result<T> = std::result::Result<T, PorticoError>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Notifier;
    struct OrderService;

    #[test]
    fn unresolvable_error_display() {
        let err = PorticoError::UnresolvableDependency(UnresolvableDependencyError {
            requested: TypeKey::of::<Notifier>(),
            chain: vec![TypeKey::of::<OrderService>(), TypeKey::of::<Notifier>()],
            profile: Some(Profile::TEST),
            suggestions: vec![],
        });

        let msg = format!("{err}");
        assert!(msg.contains("not registered"));
        assert!(msg.contains("OrderService → Notifier"));
        assert!(msg.contains("profile 'test'"));
    }

    #[test]
    fn unresolvable_required_by() {
        let err = UnresolvableDependencyError {
            requested: TypeKey::of::<Notifier>(),
            chain: vec![TypeKey::of::<OrderService>(), TypeKey::of::<Notifier>()],
            profile: None,
            suggestions: vec![],
        };
        assert_eq!(err.required_by(), Some(&TypeKey::of::<OrderService>()));
    }

    #[test]
    fn static_cycle_display_lists_set() {
        let err = CircularDependencyError {
            cycle: vec![TypeKey::of::<Notifier>(), TypeKey::of::<OrderService>()],
            detection: CycleDetection::Static,
        };
        assert!(err.to_string().contains("{Notifier, OrderService}"));
        assert!(err.involves(&TypeKey::of::<Notifier>()));
    }

    #[test]
    fn dynamic_cycle_display_renders_chain() {
        let err = PorticoError::CircularDependency(CircularDependencyError {
            cycle: vec![
                TypeKey::of::<Notifier>(),
                TypeKey::of::<OrderService>(),
                TypeKey::of::<Notifier>(),
            ],
            detection: CycleDetection::Dynamic,
        });
        assert!(err.to_string().contains("Notifier → OrderService → Notifier"));
    }

    #[test]
    fn captive_error_display() {
        let err = PorticoError::CaptiveDependency(CaptiveDependencyError {
            consumer: TypeKey::of::<OrderService>(),
            consumer_lifetime: Lifetime::Singleton,
            dependency: TypeKey::of::<Notifier>(),
            dependency_lifetime: Lifetime::Scoped,
        });

        let msg = format!("{err}");
        assert!(msg.contains("Captive dependency"));
        assert!(msg.contains("Singleton"));
        assert!(msg.contains("Scoped"));
        assert!(msg.contains("↓"));
    }

    #[test]
    fn aggregate_disposal_display() {
        let err = AggregateDisposalError {
            failures: vec![DisposalFailure {
                component: TypeKey::of::<Notifier>(),
                implementation: "SmtpNotifier",
                source: "connection reset".into(),
            }],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("1 component(s) failed to dispose"));
        assert!(msg.contains("SmtpNotifier"));
        assert!(msg.contains("connection reset"));
    }
}
