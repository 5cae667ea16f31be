//! # The Container: heart of Portico
//!
//! Owns the registry, the singleton cache, the cached dependency graph
//! and the lifecycle coordinator. [`Container`] is a cheap, cloneable,
//! thread-safe handle.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container ──create_scope()──> Scope
//!                                  │                            │
//!                             start()/stop()               dispose()
//! ```
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use portico_container::prelude::*;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self, name: &str) -> String;
//! }
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self, name: &str) -> String { format!("Hello, {name}") }
//! }
//!
//! struct Welcome {
//!     greeter: Arc<dyn Greeter>,
//! }
//!
//! let container = Container::builder()
//!     .bind(Binding::<dyn Greeter, English>::new(|_| Ok(English), |g| g as Arc<dyn Greeter>))
//!     .bind(
//!         Binding::service(|inj| Ok(Welcome { greeter: inj.get::<dyn Greeter>()? }))
//!             .depends_on::<dyn Greeter>(),
//!     )
//!     .build()
//!     .expect("Failed to build container");
//!
//! let welcome = container.resolve::<Welcome>().expect("Failed to resolve");
//! assert_eq!(welcome.greeter.greet("Ada"), "Hello, Ada");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument};

use crate::config::ContainerConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{AggregateDisposalError, Result};
use crate::graph::{DependencyGraph, GraphBuilder};
use crate::key::TypeKey;
use crate::lifecycle::Coordinator;
use crate::profile::Profile;
use crate::provider::Provider;
use crate::registry::{Binding, Component, Registration, RegistrationRecord, Registry};
use crate::resolver::{InstanceCache, ResolutionContext};
use crate::scope::{Scope, ScopeState};

// ============================================================
// ContainerBuilder
// ============================================================

/// Builds a [`Container`].
///
/// Registrations are applied in declaration order by
/// [`build()`](ContainerBuilder::build), which then builds the
/// dependency graph so captive dependencies and lifecycle cycles fail
/// at startup.
#[derive(Default)]
pub struct ContainerBuilder {
    config: ContainerConfig,
    records: Vec<RegistrationRecord>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the active environment tag.
    pub fn profile(mut self, profile: impl Into<Profile>) -> Self {
        self.config.profile = Some(profile.into());
        self
    }

    /// Allow overriding previously registered plain registrations.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.config.allow_override = allow;
        self
    }

    /// Discovery allow-list, exposed through [`Container::allowed_sources`].
    pub fn allowed_sources<S: Into<String>>(mut self, sources: impl IntoIterator<Item = S>) -> Self {
        self.config.allowed_sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    // ── Registrations ──

    /// Register a pre-built value, shared by every resolution.
    pub fn instance<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.record(RegistrationRecord::instance(value))
    }

    /// Register a pre-built shared value, e.g. an `Arc<dyn Trait>`.
    pub fn shared<T: ?Sized + Send + Sync + 'static>(self, value: Arc<T>) -> Self {
        self.record(RegistrationRecord::shared(value))
    }

    /// Register `T::default()` as a fresh-per-resolution constructor.
    pub fn class<T: Default + Send + Sync + 'static>(self) -> Self {
        self.record(RegistrationRecord::class::<T>())
    }

    /// Register a singleton factory, called once on first resolve.
    pub fn singleton_factory<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.record(RegistrationRecord::singleton_factory(factory))
    }

    /// Register a transient factory, called on every resolve.
    pub fn transient_factory<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.record(RegistrationRecord::transient_factory(factory))
    }

    /// Register an implementation binding.
    pub fn bind<C, I>(self, binding: Binding<C, I>) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        self.record(RegistrationRecord::binding(binding))
    }

    pub fn record(mut self, record: RegistrationRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Add every record of a [`Provider`].
    pub fn add_provider(mut self, provider: &dyn Provider) -> Self {
        let records = provider.records();
        debug!(
            provider = provider.name(),
            source = ?provider.source(),
            records = records.len(),
            "Adding provider"
        );
        self.records.extend(records);
        self
    }

    // ── Build ──

    /// Build the container and its dependency graph.
    ///
    /// # Errors
    /// The first registration error, or any graph error
    /// (captive dependency, lifecycle cycle).
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        info!(
            records = self.records.len(),
            profile = ?self.config.profile,
            "Building container"
        );

        let container = Container::with_config(self.config);
        container.register_all(self.records)?;
        let graph = container.graph()?;

        info!(
            contracts = container.len(),
            lifecycle = graph.lifecycle_order().len(),
            "Container built"
        );
        Ok(container)
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

struct ContainerInner {
    config: ContainerConfig,
    registry: RwLock<Registry>,
    /// Invalidated on every registration, rebuilt lazily.
    graph: RwLock<Option<Arc<DependencyGraph>>>,
    singletons: InstanceCache,
    coordinator: Coordinator,
    next_scope_id: AtomicU64,
}

/// Thread-safe dependency injection container.
///
/// Cloning is cheap and every clone shares the same registry and caches.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// An empty container with no profile filtering.
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                config,
                registry: RwLock::new(Registry::new()),
                graph: RwLock::new(None),
                singletons: InstanceCache::default(),
                coordinator: Coordinator::default(),
                next_scope_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        self.inner.config.profile.as_ref()
    }

    /// The configured discovery allow-list, untouched.
    pub fn allowed_sources(&self) -> Option<&[String]> {
        self.inner.config.allowed_sources.as_deref()
    }

    // ── Registration ──

    /// Registers `registration` under contract `key`.
    ///
    /// Allowed at any time; invalidates the cached dependency graph.
    pub fn register(&self, key: TypeKey, registration: Registration) -> Result<()> {
        let mut registry = self.inner.registry.write();
        registry.register(key, registration, self.inner.config.allow_override)?;
        *self.inner.graph.write() = None;
        Ok(())
    }

    /// Registers records in order, stopping at the first error.
    pub fn register_all(&self, records: impl IntoIterator<Item = RegistrationRecord>) -> Result<()> {
        for record in records {
            self.register(record.key, record.registration)?;
        }
        Ok(())
    }

    pub fn add_provider(&self, provider: &dyn Provider) -> Result<()> {
        let records = provider.records();
        debug!(
            provider = provider.name(),
            source = ?provider.source(),
            records = records.len(),
            "Adding provider"
        );
        self.register_all(records)
    }

    pub fn register_instance<T: Send + Sync + 'static>(&self, value: T) -> Result<()> {
        self.register_record(RegistrationRecord::instance(value))
    }

    pub fn register_shared<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> Result<()> {
        self.register_record(RegistrationRecord::shared(value))
    }

    pub fn register_class<T: Default + Send + Sync + 'static>(&self) -> Result<()> {
        self.register_record(RegistrationRecord::class::<T>())
    }

    pub fn register_singleton_factory<T, F>(&self, factory: F) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_record(RegistrationRecord::singleton_factory(factory))
    }

    pub fn register_transient_factory<T, F>(&self, factory: F) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_record(RegistrationRecord::transient_factory(factory))
    }

    pub fn register_binding<C, I>(&self, binding: Binding<C, I>) -> Result<()>
    where
        C: ?Sized + Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        self.register_record(RegistrationRecord::binding(binding))
    }

    fn register_record(&self, record: RegistrationRecord) -> Result<()> {
        self.register(record.key, record.registration)
    }

    // ── Graph ──

    /// The dependency graph for the current registry snapshot.
    ///
    /// Built on first use after each registration and cached.
    pub fn graph(&self) -> Result<Arc<DependencyGraph>> {
        if let Some(graph) = self.inner.graph.read().as_ref() {
            return Ok(Arc::clone(graph));
        }

        // Registry before graph, same order as register().
        let registry = self.inner.registry.read();
        let mut cached = self.inner.graph.write();
        if let Some(graph) = cached.as_ref() {
            return Ok(Arc::clone(graph));
        }
        let graph = Arc::new(GraphBuilder::new(&registry, self.active_profile()).build()?);
        *cached = Some(Arc::clone(&graph));
        Ok(graph)
    }

    // ── Resolution ──

    /// Resolve contract `T`.
    ///
    /// ```rust,ignore
    /// let notifier: Arc<dyn Notifier> = container.resolve::<dyn Notifier>()?;
    /// ```
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_in::<T>(None, &TypeKey::of::<T>())
    }

    /// Indexing-style sugar for [`Container::resolve`].
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve::<T>()
    }

    /// Resolve every active implementation of `T`, ordered by priority.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.resolve_all_in::<T>(None, &TypeKey::of::<T>())
    }

    /// Resolve `T` registered under an explicit (e.g. qualified) key.
    pub fn resolve_keyed<T: ?Sized + Send + Sync + 'static>(&self, key: &TypeKey) -> Result<Arc<T>> {
        self.resolve_in::<T>(None, key)
    }

    /// Resolve `key` to its type-erased instance.
    pub fn resolve_key(&self, key: &TypeKey) -> Result<Component> {
        self.resolve_key_in(None, key)
    }

    pub(crate) fn resolve_in<T: ?Sized + Send + Sync + 'static>(
        &self,
        scope: Option<&ScopeState>,
        key: &TypeKey,
    ) -> Result<Arc<T>> {
        self.graph()?;
        self.context(scope).resolve::<T>(key)
    }

    pub(crate) fn resolve_all_in<T: ?Sized + Send + Sync + 'static>(
        &self,
        scope: Option<&ScopeState>,
        key: &TypeKey,
    ) -> Result<Vec<Arc<T>>> {
        self.graph()?;
        self.context(scope).resolve_all::<T>(key)
    }

    pub(crate) fn resolve_key_in(&self, scope: Option<&ScopeState>, key: &TypeKey) -> Result<Component> {
        self.graph()?;
        self.context(scope).resolve_one(key)
    }

    fn context<'a>(&'a self, scope: Option<&'a ScopeState>) -> ResolutionContext<'a> {
        ResolutionContext {
            registry: &self.inner.registry,
            singletons: &self.inner.singletons,
            profile: self.inner.config.profile.as_ref(),
            scope,
        }
    }

    /// Create a new scope for a unit of work.
    pub fn create_scope(&self) -> Scope {
        let id = self.inner.next_scope_id.fetch_add(1, Ordering::Relaxed) + 1;
        Scope::new(self.clone(), id)
    }

    // ── Lifecycle ──

    /// Initializes every container-wide and transient lifecycle
    /// component, dependencies first.
    ///
    /// If one fails, those already initialized are disposed in reverse
    /// and the failure is returned. Starting a started container is a
    /// no-op.
    #[instrument(skip(self), name = "container_start")]
    pub async fn start(&self) -> Result<()> {
        let outcome = self
            .inner
            .coordinator
            .start(|| {
                let graph = self.graph()?;
                let context = self.context(None);
                let mut components = Vec::new();
                for candidate in graph.lifecycle_candidates() {
                    if candidate.lifetime.is_scoped() {
                        continue;
                    }
                    if let Some(managed) = context.managed(candidate)? {
                        components.push(managed);
                    }
                }
                Ok(components)
            })
            .await;

        if outcome.is_err() {
            self.inner.singletons.clear();
        }
        outcome
    }

    /// Disposes what `start()` initialized, in reverse order, then clears
    /// the singleton cache.
    ///
    /// Every component is attempted; failures are collected.
    #[instrument(skip(self), name = "container_stop")]
    pub async fn stop(&self) -> std::result::Result<(), AggregateDisposalError> {
        self.inner
            .coordinator
            .stop(|| self.inner.singletons.clear())
            .await
    }

    /// Start, run `body`, stop.
    ///
    /// `body`'s output is returned even when it is itself an error; a
    /// failed stop surfaces as
    /// [`PorticoError::AggregateDisposal`](crate::error::PorticoError::AggregateDisposal).
    ///
    /// # Panics
    /// A panic in `body` is resumed after `stop()` has run. A stop
    /// failure on that path is logged, not returned.
    pub async fn run<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(Container) -> Fut,
        Fut: Future<Output = T>,
    {
        self.start().await?;
        let container = self.clone();
        let output = AssertUnwindSafe(async move { body(container).await })
            .catch_unwind()
            .await;
        let stopped = self.stop().await;

        match output {
            Ok(output) => {
                stopped?;
                Ok(output)
            }
            Err(panic) => {
                if let Err(err) = stopped {
                    error!(failures = err.failures.len(), "Stop after a panicking body failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.inner.coordinator.is_started()
    }

    /// Keys of the initialized lifecycle components, in start order.
    pub fn started_components(&self) -> Vec<TypeKey> {
        self.inner.coordinator.initialized_keys()
    }

    // ── Introspection ──

    pub fn diagnostics(&self) -> Diagnostics {
        let registry = self.inner.registry.read();
        let graph = self.inner.graph.read().clone();
        Diagnostics::collect(&registry, &self.inner.config, graph.as_deref(), self.is_started())
    }

    /// Registered contracts, in registration order.
    pub fn list_registered(&self) -> Vec<TypeKey> {
        self.inner.registry.read().keys().to_vec()
    }

    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.is_registered_key(&TypeKey::of::<T>())
    }

    pub fn is_registered_key(&self, key: &TypeKey) -> bool {
        self.inner.registry.read().contains(key)
    }

    /// Profile → implementation names registered for contract `T`.
    pub fn implementations_for<T: ?Sized + 'static>(&self) -> BTreeMap<Profile, Vec<&'static str>> {
        self.inner.registry.read().implementations_for(&TypeKey::of::<T>())
    }

    /// Returns the number of registered contracts.
    pub fn len(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Returns true if no contracts are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.registry.read().is_empty()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.len())
            .field("profile", &self.active_profile())
            .field("started", &self.is_started())
            .finish()
    }
}

/// Convenient imports for common usage.
///
/// ```rust
/// use portico_container::prelude::*;
/// ```
pub mod prelude {
    pub use super::{Container, ContainerBuilder};
    pub use crate::config::ContainerConfig;
    pub use crate::error::{BoxError, PorticoError, Result};
    pub use crate::key::TypeKey;
    pub use crate::lifecycle::Lifecycle;
    pub use crate::lifetime::Lifetime;
    pub use crate::profile::Profile;
    pub use crate::provider::Provider;
    pub use crate::registry::{Binding, Registration, RegistrationRecord};
    pub use crate::resolver::Injector;
    pub use crate::scope::Scope;
}
