//! Scope manager.
//!
//! A [`Scope`] is a flat child resolution context: scope-bound
//! registrations are cached per scope, container-wide ones still come
//! from the parent container's singleton cache. Scopes cannot be nested.
//!
//! Lifecycle-capable scope-bound instances are captured as they are
//! created and disposed in reverse creation order by [`Scope::dispose`].
//! Scope-bound components are never initialized by the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::container::Container;
use crate::error::{Result, ScopeError, ScopeErrorKind};
use crate::key::TypeKey;
use crate::lifecycle::{Managed, dispose_in_reverse};
use crate::registry::Component;
use crate::resolver::InstanceCache;

/// Per-scope cache and capture list, read by the resolver.
pub(crate) struct ScopeState {
    pub id: u64,
    pub cache: InstanceCache,
    captured: Mutex<Vec<Managed>>,
    disposed: AtomicBool,
}

impl ScopeState {
    fn new(id: u64) -> Self {
        Self {
            id,
            cache: InstanceCache::default(),
            captured: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Records a lifecycle instance for disposal.
    ///
    /// Fails once the scope is disposed; the flag is read under the
    /// capture lock, so nothing is added after `dispose` took the list.
    pub fn capture(&self, managed: Managed) -> Result<()> {
        let mut captured = self.captured.lock();
        if self.disposed.load(Ordering::Acquire) {
            return Err(ScopeError {
                kind: ScopeErrorKind::Disposed { scope_id: self.id },
            }
            .into());
        }
        debug!(scope_id = self.id, component = %managed.key, "Captured for disposal");
        captured.push(managed);
        Ok(())
    }
}

/// A unit of work (e.g., one request) with its own scope-bound instances.
///
/// Created by [`Container::create_scope`]; call [`Scope::dispose`] when
/// the unit of work ends.
pub struct Scope {
    container: Container,
    state: ScopeState,
}

impl Scope {
    pub(crate) fn new(container: Container, id: u64) -> Self {
        debug!(scope_id = id, "Scope created");
        Self {
            container,
            state: ScopeState::new(id),
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// The container this scope was created from.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Resolves contract `T` within this scope.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.ensure_live()?;
        self.container.resolve_in::<T>(Some(&self.state), &TypeKey::of::<T>())
    }

    /// Indexing-style sugar for [`Scope::resolve`].
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve::<T>()
    }

    /// Resolves every active implementation of multi-binding contract `T`.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.ensure_live()?;
        self.container.resolve_all_in::<T>(Some(&self.state), &TypeKey::of::<T>())
    }

    /// Resolves `key` to its type-erased instance.
    pub fn resolve_key(&self, key: &TypeKey) -> Result<Component> {
        self.ensure_live()?;
        self.container.resolve_key_in(Some(&self.state), key)
    }

    /// Always fails: scopes are flat.
    pub fn create_scope(&self) -> Result<Scope> {
        Err(ScopeError {
            kind: ScopeErrorKind::Nested { scope_id: self.id() },
        }
        .into())
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }

    /// Number of scope-bound instances currently cached.
    pub fn cached(&self) -> usize {
        self.state.cache.len()
    }

    /// Disposes captured lifecycle instances in reverse creation order,
    /// then discards the scope cache.
    ///
    /// # Errors
    /// - [`ScopeError`] if the scope was already disposed
    /// - [`PorticoError::AggregateDisposal`](crate::error::PorticoError::AggregateDisposal)
    ///   if any `dispose()` failed; every instance was still attempted
    pub async fn dispose(&self) -> Result<()> {
        let captured = {
            let mut captured = self.state.captured.lock();
            if self.state.disposed.swap(true, Ordering::AcqRel) {
                return Err(ScopeError {
                    kind: ScopeErrorKind::Disposed { scope_id: self.id() },
                }
                .into());
            }
            std::mem::take(&mut *captured)
        };
        let count = captured.len();
        let outcome = dispose_in_reverse(captured).await;
        self.state.cache.clear();
        debug!(scope_id = self.id(), components = count, "Scope disposed");

        outcome.map_err(Into::into)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ScopeError {
                kind: ScopeErrorKind::Disposed { scope_id: self.id() },
            }
            .into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.state.id)
            .field("cached", &self.state.cache.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if *self.state.disposed.get_mut() {
            return;
        }
        let pending = self.state.captured.get_mut().len();
        if pending > 0 {
            warn!(
                scope_id = self.state.id,
                pending, "Scope dropped without dispose(); lifecycle instances were not disposed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{BoxError, PorticoError};
    use crate::lifecycle::Lifecycle;
    use crate::lifetime::Lifetime;
    use crate::registry::Binding;

    #[derive(Debug)]
    struct RequestContext {
        disposed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Lifecycle for RequestContext {
        async fn initialize(&self) -> std::result::Result<(), BoxError> {
            Ok(())
        }

        async fn dispose(&self) -> std::result::Result<(), BoxError> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn container(disposed: &Arc<AtomicUsize>) -> Container {
        let counter = Arc::clone(disposed);
        let container = Container::new();
        container
            .register_binding(
                Binding::service(move |_| {
                    Ok(RequestContext {
                        disposed: Arc::clone(&counter),
                    })
                })
                .lifetime(Lifetime::Scoped)
                .lifecycle(),
            )
            .unwrap();
        container
    }

    #[test]
    fn scoped_instances_are_cached_per_scope() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let container = container(&disposed);
        let a = container.create_scope();
        let b = container.create_scope();

        let a1 = a.resolve::<RequestContext>().unwrap();
        let a2 = a.resolve::<RequestContext>().unwrap();
        let b1 = b.resolve::<RequestContext>().unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b1));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn nested_scope_is_rejected() {
        let container = Container::new();
        let scope = container.create_scope();
        match scope.create_scope() {
            Err(PorticoError::Scope(e)) => {
                assert_eq!(e.kind, ScopeErrorKind::Nested { scope_id: scope.id() });
            }
            other => panic!("Expected ScopeError, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispose_runs_once() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let container = container(&disposed);
        let scope = container.create_scope();
        scope.resolve::<RequestContext>().unwrap();
        assert_eq!(scope.cached(), 1);

        scope.dispose().await.unwrap();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(scope.cached(), 0);

        assert!(matches!(scope.dispose().await, Err(PorticoError::Scope(_))));
        assert!(matches!(
            scope.resolve::<RequestContext>(),
            Err(PorticoError::Scope(_))
        ));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolution_racing_dispose_is_not_captured() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let container = container(&disposed);
        let scope = container.create_scope();
        scope.dispose().await.unwrap();

        // A resolution that passed the liveness check before dispose.
        let late = scope
            .container()
            .resolve_in::<RequestContext>(Some(&scope.state), &TypeKey::of::<RequestContext>());
        match late {
            Err(PorticoError::Scope(e)) => {
                assert_eq!(e.kind, ScopeErrorKind::Disposed { scope_id: scope.id() });
            }
            other => panic!("Expected ScopeError, got: {other:?}"),
        }
        assert_eq!(scope.cached(), 0);
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
        assert!(scope.state.captured.lock().is_empty());
    }
}
