//! Read-only introspection snapshot.
//!
//! [`Diagnostics`] captures what is registered and, if it has already
//! been computed, the dependency graph. Collecting it never builds the
//! graph or resolves anything.

use std::fmt;

use serde::Serialize;

use crate::config::ContainerConfig;
use crate::graph::{DependencyEdge, DependencyGraph, GraphNode};
use crate::key::TypeKey;
use crate::lifetime::Lifetime;
use crate::profile::{Profile, ProfileSet};
use crate::registry::{RegistrationKind, Registry};

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub profile: Option<Profile>,
    pub allowed_sources: Option<Vec<String>>,
    pub started: bool,
    pub registrations: Vec<RegistrationInfo>,
    /// `None` until the graph has been built.
    pub graph: Option<GraphInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationInfo {
    pub contract: TypeKey,
    pub kind: RegistrationKind,
    pub implementations: Vec<ImplementationInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImplementationInfo {
    pub name: &'static str,
    pub profiles: ProfileSet,
    pub lifetime: Lifetime,
    pub multi: bool,
    pub priority: i32,
    pub lifecycle: bool,
    pub dependencies: Vec<TypeKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphInfo {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<DependencyEdge>,
    pub missing: Vec<DependencyEdge>,
    pub lifecycle_order: Vec<TypeKey>,
}

impl Diagnostics {
    pub(crate) fn collect(
        registry: &Registry,
        config: &ContainerConfig,
        graph: Option<&DependencyGraph>,
        started: bool,
    ) -> Self {
        let registrations = registry
            .keys()
            .iter()
            .map(|key| {
                let candidates = registry.candidates_of(key);
                RegistrationInfo {
                    contract: key.clone(),
                    kind: candidates
                        .first()
                        .map(|c| c.kind)
                        .unwrap_or(RegistrationKind::Binding),
                    implementations: candidates
                        .iter()
                        .map(|c| ImplementationInfo {
                            name: c.name,
                            profiles: c.profiles.clone(),
                            lifetime: c.lifetime,
                            multi: c.multi,
                            priority: c.priority,
                            lifecycle: c.lifecycle,
                            dependencies: c.dependencies.iter().map(|d| d.key.clone()).collect(),
                        })
                        .collect(),
                }
            })
            .collect();

        let graph = graph.map(|graph| GraphInfo {
            nodes: graph.nodes(),
            edges: graph.edges().to_vec(),
            missing: graph.missing().to_vec(),
            lifecycle_order: graph.lifecycle_order().into_iter().cloned().collect(),
        });

        Self {
            profile: config.profile.clone(),
            allowed_sources: config.allowed_sources.clone(),
            started,
            registrations,
            graph,
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.profile {
            Some(profile) => writeln!(f, "Container (profile '{profile}')")?,
            None => writeln!(f, "Container (no profile)")?,
        }
        writeln!(f, "  started: {}", self.started)?;
        for registration in &self.registrations {
            writeln!(
                f,
                "  {} [{}]",
                registration.contract.short_name(),
                registration.kind.as_str()
            )?;
            for implementation in &registration.implementations {
                write!(
                    f,
                    "    - {} {} {}",
                    implementation.name, implementation.lifetime, implementation.profiles
                )?;
                if implementation.multi {
                    write!(f, " multi(priority {})", implementation.priority)?;
                }
                if implementation.lifecycle {
                    write!(f, " lifecycle")?;
                }
                writeln!(f)?;
            }
        }
        if let Some(graph) = &self.graph {
            let order: Vec<String> = graph.lifecycle_order.iter().map(TypeKey::short_name).collect();
            writeln!(f, "  lifecycle order: {}", order.join(" → "))?;
            for edge in &graph.missing {
                writeln!(
                    f,
                    "  missing: {} needs {}",
                    edge.consumer.short_name(),
                    edge.dependency.short_name()
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::GraphBuilder;
    use crate::registry::{Binding, Registration};

    struct Mailer;

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.register(TypeKey::of::<u32>(), Registration::instance(Arc::new(3u32)), false)
            .unwrap();
        reg.register(
            TypeKey::of::<Mailer>(),
            Binding::service(|_| Ok(Mailer))
                .profile(Profile::TEST)
                .depends_on::<u32>()
                .into_registration(),
            false,
        )
        .unwrap();
        reg
    }

    #[test]
    fn collects_registrations_without_graph() {
        let reg = registry();
        let diagnostics = Diagnostics::collect(&reg, &ContainerConfig::default(), None, false);

        assert_eq!(diagnostics.registrations.len(), 2);
        assert_eq!(diagnostics.registrations[0].kind, RegistrationKind::Instance);
        let mailer = &diagnostics.registrations[1].implementations[0];
        assert_eq!(mailer.dependencies, vec![TypeKey::of::<u32>()]);
        assert!(diagnostics.graph.is_none());
    }

    #[test]
    fn serializes_to_json() {
        let reg = registry();
        let graph = GraphBuilder::new(&reg, Some(&Profile::TEST)).build().unwrap();
        let config = ContainerConfig::with_profile(Profile::TEST);
        let diagnostics = Diagnostics::collect(&reg, &config, Some(&graph), false);

        let json = serde_json::to_value(&diagnostics).unwrap();
        assert_eq!(json["profile"], "test");
        assert_eq!(json["registrations"][1]["implementations"][0]["lifetime"], "singleton");
        assert_eq!(json["graph"]["edges"].as_array().map(Vec::len), Some(1));
        assert!(diagnostics.to_string().contains("Mailer"));
    }
}
