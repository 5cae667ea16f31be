//! Lifecycle management: ordered initialization and reverse disposal.
//!
//! Components that implement [`Lifecycle`] and are registered with
//! [`Binding::lifecycle`](crate::registry::Binding::lifecycle) are
//! initialized by `Container::start()` in dependency order and disposed
//! in exactly the reverse order by `Container::stop()`.
//!
//! If `initialize()` fails part-way, every component already initialized
//! is disposed in reverse before the error is returned. Disposal never
//! stops early: each failure is logged and collected into an
//! [`AggregateDisposalError`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{AggregateDisposalError, BoxError, DisposalFailure, LifecycleInitializationError, Result};
use crate::key::TypeKey;

/// Start/stop hooks for a managed component.
///
/// # Examples
/// ```
/// use async_trait::async_trait;
/// use portico_container::error::BoxError;
/// use portico_container::lifecycle::Lifecycle;
///
/// struct Pool;
///
/// #[async_trait]
/// impl Lifecycle for Pool {
///     async fn initialize(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
///
///     async fn dispose(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// Acquire resources. Called once per `start()`.
    async fn initialize(&self) -> std::result::Result<(), BoxError>;

    /// Release resources. Must tolerate being called after a failed start.
    async fn dispose(&self) -> std::result::Result<(), BoxError>;
}

/// A lifecycle instance captured for later disposal.
#[derive(Clone)]
pub(crate) struct Managed {
    pub key: TypeKey,
    pub implementation: &'static str,
    pub component: Arc<dyn Lifecycle>,
}

impl std::fmt::Debug for Managed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Managed")
            .field("key", &self.key)
            .field("implementation", &self.implementation)
            .finish()
    }
}

/// Initializes `components` in order.
///
/// On failure, disposes every already-initialized component in reverse
/// (logging, not propagating, their errors) and returns the original
/// failure.
pub(crate) async fn initialize_in_order(
    components: Vec<Managed>,
) -> std::result::Result<Vec<Managed>, LifecycleInitializationError> {
    let mut initialized: Vec<Managed> = Vec::with_capacity(components.len());

    for managed in components {
        debug!(component = %managed.key, implementation = managed.implementation, "Initializing");
        if let Err(source) = managed.component.initialize().await {
            error!(
                component = %managed.key,
                implementation = managed.implementation,
                error = %source,
                rollback = initialized.len(),
                "Initialization failed, rolling back"
            );
            rollback(&initialized).await;
            return Err(LifecycleInitializationError {
                component: managed.key,
                implementation: managed.implementation,
                source,
            });
        }
        initialized.push(managed);
    }

    Ok(initialized)
}

async fn rollback(initialized: &[Managed]) {
    for managed in initialized.iter().rev() {
        debug!(component = %managed.key, "Rolling back");
        if let Err(err) = managed.component.dispose().await {
            error!(
                component = %managed.key,
                implementation = managed.implementation,
                error = %err,
                "Dispose failed during rollback"
            );
        }
    }
}

/// Disposes `components` in reverse, attempting every one.
pub(crate) async fn dispose_in_reverse(
    components: Vec<Managed>,
) -> std::result::Result<(), AggregateDisposalError> {
    let mut failures = Vec::new();

    for managed in components.into_iter().rev() {
        debug!(component = %managed.key, implementation = managed.implementation, "Disposing");
        if let Err(source) = managed.component.dispose().await {
            error!(
                component = %managed.key,
                implementation = managed.implementation,
                error = %source,
                "Dispose failed"
            );
            failures.push(DisposalFailure {
                component: managed.key,
                implementation: managed.implementation,
                source,
            });
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(AggregateDisposalError { failures })
    }
}

/// Serialises `start()`/`stop()` and remembers what was initialized.
///
/// `None` means stopped; `Some` holds the initialized components in
/// initialization order.
#[derive(Default)]
pub(crate) struct Coordinator {
    gate: tokio::sync::Mutex<()>,
    initialized: Mutex<Option<Vec<Managed>>>,
}

impl Coordinator {
    /// Runs `collect` (which resolves the lifecycle components in order)
    /// and initializes the result. A second start is a no-op.
    pub async fn start<F>(&self, collect: F) -> Result<()>
    where
        F: FnOnce() -> Result<Vec<Managed>>,
    {
        let _gate = self.gate.lock().await;
        if self.initialized.lock().is_some() {
            warn!("Container already started, ignoring start()");
            return Ok(());
        }

        let components = collect()?;
        let count = components.len();
        let initialized = initialize_in_order(components).await?;
        *self.initialized.lock() = Some(initialized);

        info!(components = count, "Container started");
        Ok(())
    }

    /// Disposes everything `start()` initialized, then runs `on_stopped`
    /// while still holding the gate. Stopping a stopped container is a
    /// no-op.
    pub async fn stop<F>(&self, on_stopped: F) -> std::result::Result<(), AggregateDisposalError>
    where
        F: FnOnce(),
    {
        let _gate = self.gate.lock().await;
        let taken = { self.initialized.lock().take() };
        let Some(initialized) = taken else {
            debug!("Container not started, nothing to stop");
            return Ok(());
        };

        let count = initialized.len();
        let outcome = dispose_in_reverse(initialized).await;
        on_stopped();
        match &outcome {
            Ok(()) => info!(components = count, "Container stopped"),
            Err(err) => warn!(components = count, failures = err.failures.len(), "Container stopped with failures"),
        }
        outcome
    }

    pub fn is_started(&self) -> bool {
        self.initialized.lock().is_some()
    }

    /// Keys of the initialized components, in initialization order.
    pub fn initialized_keys(&self) -> Vec<TypeKey> {
        self.initialized
            .lock()
            .as_ref()
            .map(|list| list.iter().map(|m| m.key.clone()).collect())
            .unwrap_or_default()
    }
}
