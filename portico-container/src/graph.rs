//! Dependency graph builder.
//!
//! Builds the graph of active registrations for one registry snapshot
//! and profile, then:
//! - rejects captive dependencies (container-wide consumer, scope-bound
//!   dependency) by walking every edge
//! - orders lifecycle components with Kahn's algorithm, dependencies
//!   first, ties broken by declaration order
//! - rejects cycles among lifecycle components (static detection)
//!
//! Missing dependencies are recorded, not rejected: they surface as
//! [`UnresolvableDependencyError`](crate::error::UnresolvableDependencyError)
//! on first resolution, with the full chain.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::{CaptiveDependencyError, CircularDependencyError, CycleDetection, PorticoError, Result};
use crate::key::TypeKey;
use crate::lifetime::Lifetime;
use crate::profile::Profile;
use crate::registry::{Candidate, Registry};

/// A declared dependency between two contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub consumer: TypeKey,
    pub dependency: TypeKey,
}

/// One active registration in the graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub key: TypeKey,
    pub implementation: &'static str,
    pub lifetime: Lifetime,
    pub lifecycle: bool,
}

/// The validated graph for one registry snapshot.
#[derive(Debug)]
pub struct DependencyGraph {
    profile: Option<Profile>,
    candidates: Vec<Arc<Candidate>>,
    edges: Vec<DependencyEdge>,
    missing: Vec<DependencyEdge>,
    /// Indices into `candidates`.
    lifecycle_order: Vec<usize>,
}

impl DependencyGraph {
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Active registrations in declaration order.
    pub fn nodes(&self) -> Vec<GraphNode> {
        self.candidates
            .iter()
            .map(|c| GraphNode {
                key: c.key.clone(),
                implementation: c.name,
                lifetime: c.lifetime,
                lifecycle: c.lifecycle,
            })
            .collect()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Declared dependencies with no active registration.
    pub fn missing(&self) -> &[DependencyEdge] {
        &self.missing
    }

    /// Contracts `key` declares as dependencies.
    pub fn dependencies_of(&self, key: &TypeKey) -> Vec<&TypeKey> {
        self.edges
            .iter()
            .filter(|edge| &edge.consumer == key)
            .map(|edge| &edge.dependency)
            .collect()
    }

    /// Lifecycle components, dependencies before dependents.
    pub fn lifecycle_order(&self) -> Vec<&TypeKey> {
        self.lifecycle_order
            .iter()
            .map(|&i| &self.candidates[i].key)
            .collect()
    }

    pub(crate) fn lifecycle_candidates(&self) -> impl Iterator<Item = &Arc<Candidate>> {
        self.lifecycle_order.iter().map(|&i| &self.candidates[i])
    }
}

pub(crate) struct GraphBuilder {
    profile: Option<Profile>,
    candidates: Vec<Arc<Candidate>>,
    by_key: HashMap<TypeKey, Vec<usize>>,
}

impl GraphBuilder {
    pub fn new(registry: &Registry, profile: Option<&Profile>) -> Self {
        let candidates = registry.active_candidates(profile);
        let mut by_key: HashMap<TypeKey, Vec<usize>> = HashMap::new();
        for (index, candidate) in candidates.iter().enumerate() {
            by_key.entry(candidate.key.clone()).or_default().push(index);
        }
        Self {
            profile: profile.cloned(),
            candidates,
            by_key,
        }
    }

    /// Builds and validates the graph.
    ///
    /// # Errors
    /// - [`PorticoError::CaptiveDependency`] for a singleton depending on a scoped contract
    /// - [`PorticoError::CircularDependency`] for a cycle among lifecycle components
    #[instrument(skip(self), name = "graph_build", fields(nodes = self.candidates.len()))]
    pub fn build(self) -> Result<DependencyGraph> {
        let (edges, missing) = self.collect_edges();
        self.check_captive()?;
        let lifecycle_order = self.lifecycle_order()?;

        debug!(
            edges = edges.len(),
            missing = missing.len(),
            lifecycle = lifecycle_order.len(),
            "Dependency graph built"
        );

        Ok(DependencyGraph {
            profile: self.profile,
            candidates: self.candidates,
            edges,
            missing,
            lifecycle_order,
        })
    }

    fn collect_edges(&self) -> (Vec<DependencyEdge>, Vec<DependencyEdge>) {
        let mut edges = Vec::new();
        let mut missing = Vec::new();

        for candidate in &self.candidates {
            for dependency in &candidate.dependencies {
                let edge = DependencyEdge {
                    consumer: candidate.key.clone(),
                    dependency: dependency.key.clone(),
                };
                // A multi dependency with no implementations is an empty list, not a gap.
                if self.by_key.contains_key(&dependency.key) || dependency.many {
                    edges.push(edge);
                } else {
                    warn!(
                        consumer = %edge.consumer,
                        dependency = %edge.dependency,
                        "Declared dependency has no active registration"
                    );
                    missing.push(edge);
                }
            }
        }

        (edges, missing)
    }

    fn check_captive(&self) -> Result<()> {
        for consumer in &self.candidates {
            for dependency in &consumer.dependencies {
                for &index in self.by_key.get(&dependency.key).into_iter().flatten() {
                    let target = &self.candidates[index];
                    if !consumer.lifetime.can_capture(target.lifetime) {
                        warn!(
                            consumer = %consumer.key,
                            consumer_lifetime = %consumer.lifetime,
                            dependency = %target.key,
                            dependency_lifetime = %target.lifetime,
                            "Captive dependency detected"
                        );
                        return Err(PorticoError::CaptiveDependency(CaptiveDependencyError {
                            consumer: consumer.key.clone(),
                            consumer_lifetime: consumer.lifetime,
                            dependency: target.key.clone(),
                            dependency_lifetime: target.lifetime,
                        }));
                    }
                }
            }
        }
        Ok(())
    }

    fn direct_dependencies(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.candidates[index]
            .dependencies
            .iter()
            .flat_map(|dependency| self.by_key.get(&dependency.key).into_iter().flatten().copied())
    }

    /// Lifecycle nodes reachable from `index`, looking through
    /// non-lifecycle nodes.
    fn lifecycle_dependencies(&self, index: usize) -> Vec<usize> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<usize> = self.direct_dependencies(index).collect();

        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            if self.candidates[next].lifecycle {
                found.push(next);
            } else {
                stack.extend(self.direct_dependencies(next));
            }
        }

        found.sort_unstable();
        found
    }

    /// Kahn's algorithm over lifecycle nodes.
    fn lifecycle_order(&self) -> Result<Vec<usize>> {
        let lifecycle: Vec<usize> = (0..self.candidates.len())
            .filter(|&i| self.candidates[i].lifecycle)
            .collect();

        let mut in_degree = vec![0usize; self.candidates.len()];
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
        for &node in &lifecycle {
            let dependencies = self.lifecycle_dependencies(node);
            in_degree[node] = dependencies.len();
            for dependency in dependencies {
                dependents.entry(dependency).or_default().push(node);
            }
        }

        let mut queue: VecDeque<usize> = lifecycle
            .iter()
            .copied()
            .filter(|&node| in_degree[node] == 0)
            .collect();
        let mut order = Vec::with_capacity(lifecycle.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &dependent in dependents.get(&node).into_iter().flatten() {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() < lifecycle.len() {
            let cycle: Vec<TypeKey> = lifecycle
                .iter()
                .filter(|&&node| !order.contains(&node))
                .map(|&node| self.candidates[node].key.clone())
                .collect();
            warn!(cycle = ?cycle, "Circular dependency among lifecycle components");
            return Err(PorticoError::CircularDependency(CircularDependencyError {
                cycle,
                detection: CycleDetection::Static,
            }));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::BoxError;
    use crate::lifecycle::Lifecycle;
    use crate::registry::{Binding, Registration};

    struct Database;
    struct Cache;
    struct Repository;
    struct Handler;

    macro_rules! lifecycle_noop {
        ($($ty:ty),*) => {$(
            #[async_trait]
            impl Lifecycle for $ty {
                async fn initialize(&self) -> std::result::Result<(), BoxError> { Ok(()) }
                async fn dispose(&self) -> std::result::Result<(), BoxError> { Ok(()) }
            }
        )*};
    }

    lifecycle_noop!(Database, Cache, Repository, Handler);

    fn register(reg: &mut Registry, key: TypeKey, registration: Registration) {
        reg.register(key, registration, false).unwrap();
    }

    fn build(reg: &Registry) -> Result<DependencyGraph> {
        GraphBuilder::new(reg, None).build()
    }

    fn names(keys: Vec<&TypeKey>) -> Vec<String> {
        keys.into_iter().map(TypeKey::short_name).collect()
    }

    #[test]
    fn lifecycle_chain_is_ordered_dependencies_first() {
        let mut reg = Registry::new();
        register(
            &mut reg,
            TypeKey::of::<Handler>(),
            Binding::service(|_| Ok(Handler)).depends_on::<Repository>().lifecycle().into_registration(),
        );
        register(
            &mut reg,
            TypeKey::of::<Repository>(),
            Binding::service(|_| Ok(Repository)).depends_on::<Database>().lifecycle().into_registration(),
        );
        register(
            &mut reg,
            TypeKey::of::<Database>(),
            Binding::service(|_| Ok(Database)).lifecycle().into_registration(),
        );

        let graph = build(&reg).unwrap();
        assert_eq!(names(graph.lifecycle_order()), vec!["Database", "Repository", "Handler"]);
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn order_looks_through_plain_components() {
        struct Config;
        let mut reg = Registry::new();
        register(
            &mut reg,
            TypeKey::of::<Handler>(),
            Binding::service(|_| Ok(Handler)).depends_on::<Config>().lifecycle().into_registration(),
        );
        register(
            &mut reg,
            TypeKey::of::<Config>(),
            Binding::service(|_| Ok(Config)).depends_on::<Database>().into_registration(),
        );
        register(
            &mut reg,
            TypeKey::of::<Database>(),
            Binding::service(|_| Ok(Database)).lifecycle().into_registration(),
        );

        let graph = build(&reg).unwrap();
        assert_eq!(names(graph.lifecycle_order()), vec!["Database", "Handler"]);
    }

    #[test]
    fn independent_components_keep_declaration_order() {
        let mut reg = Registry::new();
        register(&mut reg, TypeKey::of::<Cache>(), Binding::service(|_| Ok(Cache)).lifecycle().into_registration());
        register(&mut reg, TypeKey::of::<Database>(), Binding::service(|_| Ok(Database)).lifecycle().into_registration());

        let graph = build(&reg).unwrap();
        assert_eq!(names(graph.lifecycle_order()), vec!["Cache", "Database"]);
    }

    #[test]
    fn lifecycle_cycle_is_static_error() {
        let mut reg = Registry::new();
        register(
            &mut reg,
            TypeKey::of::<Database>(),
            Binding::service(|_| Ok(Database)).depends_on::<Cache>().lifecycle().into_registration(),
        );
        register(
            &mut reg,
            TypeKey::of::<Cache>(),
            Binding::service(|_| Ok(Cache)).depends_on::<Database>().lifecycle().into_registration(),
        );
        register(&mut reg, TypeKey::of::<Handler>(), Binding::service(|_| Ok(Handler)).lifecycle().into_registration());

        match build(&reg) {
            Err(PorticoError::CircularDependency(e)) => {
                assert_eq!(e.detection, CycleDetection::Static);
                assert_eq!(e.cycle, vec![TypeKey::of::<Database>(), TypeKey::of::<Cache>()]);
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn captive_dependency_rejected() {
        let mut reg = Registry::new();
        register(
            &mut reg,
            TypeKey::of::<Repository>(),
            Binding::service(|_| Ok(Repository)).lifetime(Lifetime::Scoped).into_registration(),
        );
        register(
            &mut reg,
            TypeKey::of::<Handler>(),
            Binding::service(|_| Ok(Handler)).depends_on::<Repository>().into_registration(),
        );

        match build(&reg) {
            Err(PorticoError::CaptiveDependency(e)) => {
                assert_eq!(e.consumer, TypeKey::of::<Handler>());
                assert_eq!(e.dependency, TypeKey::of::<Repository>());
                assert_eq!(e.dependency_lifetime, Lifetime::Scoped);
            }
            other => panic!("Expected CaptiveDependency, got: {other:?}"),
        }
    }

    #[test]
    fn scoped_and_transient_consumers_may_use_scoped() {
        let mut reg = Registry::new();
        register(
            &mut reg,
            TypeKey::of::<Repository>(),
            Binding::service(|_| Ok(Repository)).lifetime(Lifetime::Scoped).into_registration(),
        );
        register(
            &mut reg,
            TypeKey::of::<Handler>(),
            Binding::service(|_| Ok(Handler))
                .depends_on::<Repository>()
                .lifetime(Lifetime::Transient)
                .into_registration(),
        );
        assert!(build(&reg).is_ok());
    }

    #[test]
    fn missing_dependency_is_recorded() {
        let mut reg = Registry::new();
        register(
            &mut reg,
            TypeKey::of::<Handler>(),
            Binding::service(|_| Ok(Handler)).depends_on::<Database>().into_registration(),
        );
        register(&mut reg, TypeKey::of::<Cache>(), Registration::instance(Arc::new(Cache)));

        let graph = build(&reg).unwrap();
        assert_eq!(graph.missing().len(), 1);
        assert_eq!(graph.missing()[0].dependency, TypeKey::of::<Database>());
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn profile_filters_nodes() {
        let mut reg = Registry::new();
        register(
            &mut reg,
            TypeKey::of::<Database>(),
            Binding::service(|_| Ok(Database)).profile(Profile::PRODUCTION).lifecycle().into_registration(),
        );
        register(&mut reg, TypeKey::of::<Cache>(), Binding::service(|_| Ok(Cache)).lifecycle().into_registration());

        let graph = GraphBuilder::new(&reg, Some(&Profile::TEST)).build().unwrap();
        assert_eq!(names(graph.lifecycle_order()), vec!["Cache"]);
        assert_eq!(graph.profile(), Some(&Profile::TEST));
    }
}
