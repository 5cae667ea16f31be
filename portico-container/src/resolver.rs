//! Resolution engine.
//!
//! Turns a contract key into an instance: looks up the candidate active
//! for the container's profile, resolves its declared dependencies,
//! calls the producer, and caches the result according to its
//! [`Lifetime`].
//!
//! A thread-local resolution stack detects cycles while resolving: a key
//! entered twice on the same thread fails with a dynamic
//! [`CircularDependencyError`] that carries the full chain.

use std::any::type_name;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Condvar, Mutex, RwLock};
use portico_support::rendering::suggest_similar;
use tracing::{trace, warn};

use crate::error::{
    AmbiguousRegistrationError, CircularDependencyError, CycleDetection, PorticoError, Result,
    ScopeError, ScopeErrorKind, UnresolvableDependencyError,
};
use crate::key::TypeKey;
use crate::lifecycle::Managed;
use crate::lifetime::Lifetime;
use crate::profile::Profile;
use crate::registry::{Candidate, Component, Lookup, Registry, Source};
use crate::scope::ScopeState;

thread_local! {
    static RESOLVE_STACK: RefCell<Vec<TypeKey>> = const { RefCell::new(Vec::new()) };
}

/// Pops its key from the thread-local resolution stack on drop.
#[derive(Debug)]
pub(crate) struct ResolveGuard {
    key: TypeKey,
}

impl ResolveGuard {
    /// Fails if `key` is already being resolved on this thread.
    pub fn push(key: &TypeKey) -> Result<Self> {
        RESOLVE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(key) {
                let mut cycle = stack.clone();
                cycle.push(key.clone());
                warn!(key = %key, depth = cycle.len(), "Circular dependency detected while resolving");
                return Err(PorticoError::CircularDependency(CircularDependencyError {
                    cycle,
                    detection: CycleDetection::Dynamic,
                }));
            }
            stack.push(key.clone());
            Ok(ResolveGuard { key: key.clone() })
        })
    }

    /// Snapshot of the in-progress chain, outermost first.
    pub fn chain() -> Vec<TypeKey> {
        RESOLVE_STACK.with(|stack| stack.borrow().clone())
    }
}

impl Drop for ResolveGuard {
    fn drop(&mut self) {
        RESOLVE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(popped.as_ref(), Some(&self.key));
        });
    }
}

/// Cells currently being produced, and the cell each blocked thread
/// waits for.
///
/// Shared by every cache, so a cycle whose halves run on different
/// threads is reported instead of leaving both threads blocked.
#[derive(Default)]
struct InFlight {
    /// Cell address -> producing thread and the key it produces.
    owners: HashMap<usize, (ThreadId, TypeKey)>,
    waiting: HashMap<ThreadId, usize>,
}

impl InFlight {
    /// Follows the wait-for chain from `owner`. Returns the cycle if it
    /// leads back to `me`, starting and ending with the key `me` holds.
    fn cycle_through(&self, owner: ThreadId, requested: &TypeKey, me: ThreadId) -> Option<Vec<TypeKey>> {
        let mut keys = vec![requested.clone()];
        let mut current = owner;

        for _ in 0..=self.owners.len() {
            if current == me {
                let held = keys.last()?.clone();
                return Some(std::iter::once(held).chain(keys).collect());
            }
            let cell = self.waiting.get(&current)?;
            let (next, key) = self.owners.get(cell)?;
            keys.push(key.clone());
            current = *next;
        }
        None
    }
}

#[derive(Default)]
struct InFlightTable {
    state: Mutex<InFlight>,
    changed: Condvar,
}

static IN_FLIGHT: Lazy<InFlightTable> = Lazy::new(InFlightTable::default);

/// Releases a claimed cell and wakes the threads waiting on it.
struct Claim {
    cell: usize,
}

impl Drop for Claim {
    fn drop(&mut self) {
        IN_FLIGHT.state.lock().owners.remove(&self.cell);
        IN_FLIGHT.changed.notify_all();
    }
}

/// Per-slot cache for singleton or scoped instances.
///
/// Each slot is a [`OnceCell`] produced by exactly one claiming thread;
/// concurrent first resolutions wait for it and see the same instance.
/// A failed producer leaves the slot empty and lets a waiter retry.
#[derive(Default)]
pub(crate) struct InstanceCache {
    slots: DashMap<u64, Arc<OnceCell<Component>>>,
}

impl InstanceCache {
    pub fn get_or_try_init<F>(&self, slot: u64, key: &TypeKey, init: F) -> Result<Component>
    where
        F: FnOnce() -> Result<Component>,
    {
        // Clone the cell out so the map shard is not locked while producing.
        let cell = Arc::clone(self.slots.entry(slot).or_default().value());
        if let Some(hit) = cell.get() {
            trace!(slot, "Cache hit");
            return Ok(hit.clone());
        }

        let id = Arc::as_ptr(&cell) as usize;
        let me = thread::current().id();
        let mut state = IN_FLIGHT.state.lock();
        loop {
            if let Some(hit) = cell.get() {
                state.waiting.remove(&me);
                return Ok(hit.clone());
            }
            let Some(owner) = state.owners.get(&id).map(|(owner, _)| *owner) else {
                break;
            };
            if let Some(cycle) = state.cycle_through(owner, key, me) {
                state.waiting.remove(&me);
                warn!(key = %key, depth = cycle.len(), "Circular dependency detected across threads");
                return Err(PorticoError::CircularDependency(CircularDependencyError {
                    cycle,
                    detection: CycleDetection::Dynamic,
                }));
            }
            state.waiting.insert(me, id);
            IN_FLIGHT.changed.wait(&mut state);
        }
        state.waiting.remove(&me);
        state.owners.insert(id, (me, key.clone()));
        drop(state);

        let _claim = Claim { cell: id };
        let component = init()?;
        Ok(cell.get_or_init(|| component).clone())
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value().get().is_some()).count()
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

/// A dependency resolved ahead of the producer call.
enum Prepared {
    One(Component),
    Many(Vec<Component>),
}

/// Everything a single resolution needs: registry, caches, profile and
/// (optionally) the current scope.
#[derive(Clone, Copy)]
pub(crate) struct ResolutionContext<'a> {
    pub registry: &'a RwLock<Registry>,
    pub singletons: &'a InstanceCache,
    pub profile: Option<&'a Profile>,
    pub scope: Option<&'a ScopeState>,
}

impl<'a> ResolutionContext<'a> {
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self, key: &TypeKey) -> Result<Arc<T>> {
        let component = self.resolve_one(key)?;
        downcast::<T>(key, &component)
    }

    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self, key: &TypeKey) -> Result<Vec<Arc<T>>> {
        self.resolve_many(key)?
            .iter()
            .map(|component| downcast::<T>(key, component))
            .collect()
    }

    /// Resolves a single-binding (or plain) contract.
    pub fn resolve_one(&self, key: &TypeKey) -> Result<Component> {
        let _guard = ResolveGuard::push(key)?;
        trace!(key = %key, "Resolving");

        let lookup = self.registry.read().lookup(key, self.profile)?;
        match lookup {
            None => Err(self.unresolvable(key)),
            Some(Lookup::Single(candidate)) => self.provide(&candidate),
            Some(Lookup::Multi(candidates)) => {
                Err(PorticoError::AmbiguousRegistration(AmbiguousRegistrationError {
                    contract: key.clone(),
                    profile: self.profile.cloned(),
                    implementations: candidates.iter().map(|c| c.name).collect(),
                    multi: true,
                }))
            }
        }
    }

    /// Resolves every active implementation of a contract.
    ///
    /// Unregistered contracts resolve to an empty list; a single-binding
    /// contract to a one-element list.
    pub fn resolve_many(&self, key: &TypeKey) -> Result<Vec<Component>> {
        let _guard = ResolveGuard::push(key)?;
        trace!(key = %key, "Resolving all");

        let lookup = self.registry.read().lookup(key, self.profile)?;
        match lookup {
            None => Ok(Vec::new()),
            Some(Lookup::Single(candidate)) => Ok(vec![self.provide(&candidate)?]),
            Some(Lookup::Multi(candidates)) => candidates
                .iter()
                .map(|candidate| self.provide(candidate))
                .collect(),
        }
    }

    /// Resolves one specific candidate (used by `start()`).
    pub fn resolve_candidate(&self, candidate: &Candidate) -> Result<Component> {
        let _guard = ResolveGuard::push(&candidate.key)?;
        self.provide(candidate)
    }

    /// Resolves a lifecycle candidate into the handle `start()` manages.
    pub fn managed(&self, candidate: &Candidate) -> Result<Option<Managed>> {
        let component = self.resolve_candidate(candidate)?;
        Ok(component.lifecycle().map(|lifecycle| Managed {
            key: candidate.key.clone(),
            implementation: candidate.name,
            component: Arc::clone(lifecycle),
        }))
    }

    fn provide(&self, candidate: &Candidate) -> Result<Component> {
        if let Source::Shared(component) = &candidate.source {
            return Ok(component.clone());
        }

        match candidate.lifetime {
            Lifetime::Singleton => {
                // Container-wide instances never see the current scope.
                let root = ResolutionContext { scope: None, ..*self };
                self.singletons
                    .get_or_try_init(candidate.id, &candidate.key, || root.produce(candidate))
            }
            Lifetime::Scoped => {
                let scope = self.scope.ok_or_else(|| ScopeError {
                    kind: ScopeErrorKind::NoActiveScope {
                        key: candidate.key.clone(),
                    },
                })?;
                scope.cache.get_or_try_init(candidate.id, &candidate.key, || {
                    let component = self.produce(candidate)?;
                    if let Some(lifecycle) = component.lifecycle() {
                        scope.capture(Managed {
                            key: candidate.key.clone(),
                            implementation: candidate.name,
                            component: Arc::clone(lifecycle),
                        })?;
                    }
                    Ok(component)
                })
            }
            Lifetime::Transient => self.produce(candidate),
        }
    }

    fn produce(&self, candidate: &Candidate) -> Result<Component> {
        let producer = match &candidate.source {
            Source::Shared(component) => return Ok(component.clone()),
            Source::Produce(producer) => producer,
        };

        trace!(
            key = %candidate.key,
            implementation = candidate.name,
            lifetime = %candidate.lifetime,
            "Producing instance"
        );

        let mut prepared = HashMap::with_capacity(candidate.dependencies.len());
        for dependency in &candidate.dependencies {
            let value = if dependency.many {
                Prepared::Many(self.resolve_many(&dependency.key)?)
            } else {
                Prepared::One(self.resolve_one(&dependency.key)?)
            };
            prepared.insert(dependency.key.clone(), value);
        }

        let injector = Injector {
            context: self,
            consumer: &candidate.key,
            prepared,
        };
        producer(&injector)
    }

    fn unresolvable(&self, key: &TypeKey) -> PorticoError {
        let registry = self.registry.read();
        let available: Vec<&str> = registry.keys().iter().map(TypeKey::type_name).collect();
        let suggestions = suggest_similar(key.type_name(), &available, 3);

        PorticoError::UnresolvableDependency(UnresolvableDependencyError {
            requested: key.clone(),
            chain: ResolveGuard::chain(),
            profile: self.profile.cloned(),
            suggestions,
        })
    }
}

pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(key: &TypeKey, component: &Component) -> Result<Arc<T>> {
    component.downcast::<T>().ok_or_else(|| {
        PorticoError::construction(key, format!("registered value is not an Arc<{}>", type_name::<T>()))
    })
}

/// Hands a producer its dependencies.
///
/// Dependencies declared on the binding were resolved before the
/// producer was called; anything else is resolved on demand through the
/// same context, so cycle detection and scoping still apply.
pub struct Injector<'a> {
    context: &'a ResolutionContext<'a>,
    consumer: &'a TypeKey,
    prepared: HashMap<TypeKey, Prepared>,
}

impl Injector<'_> {
    /// Resolves contract `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_keyed::<T>(&TypeKey::of::<T>())
    }

    /// Resolves contract `T` under an explicit (e.g. qualified) key.
    pub fn get_keyed<T: ?Sized + Send + Sync + 'static>(&self, key: &TypeKey) -> Result<Arc<T>> {
        let component = match self.prepared.get(key) {
            Some(Prepared::One(component)) => component.clone(),
            _ => self.context.resolve_one(key)?,
        };
        downcast::<T>(key, &component)
    }

    /// Resolves every implementation of multi-binding contract `T`.
    pub fn get_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let key = TypeKey::of::<T>();
        match self.prepared.get(&key) {
            Some(Prepared::Many(components)) => components
                .iter()
                .map(|component| downcast::<T>(&key, component))
                .collect(),
            _ => self.context.resolve_all::<T>(&key),
        }
    }

    /// The contract currently being produced.
    pub fn consumer(&self) -> &TypeKey {
        self.consumer
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.context.profile
    }
}
