//! Component registry with dependency injection and cycle detection.
//!
//! A [`ComponentRegistry`] maps names to factories plus their declared
//! dependencies. Resolution walks the dependency graph leaves-first,
//! injecting each resolved instance into the dependent's factory.
//! Optional dependencies resolve to an absent value instead of failing
//! when unregistered; callers can also pre-seed instances through a
//! [`ResolutionContext`] to bypass factories entirely (test doubles,
//! shared singletons).
//!
//! The registry is generic over the component handle type so the same
//! machinery serves pipeline components (`Arc<dyn PipelineComponent>`)
//! and anything else a composition root wants to wire. Nothing here is
//! memoized: every `get` re-resolves and re-invokes, and callers who
//! need singleton semantics pass shared instances through the context.
//!
//! There is deliberately no process-wide registry instance. Construct
//! one at your composition root and pass it by reference.

use std::collections::HashMap;

use crate::error::RegistryError;

// ── Dependency specification ─────────────────────────────────────

/// A declared dependency of a registered component.
///
/// Optional dependencies do not have to be registered: resolution
/// substitutes an absent value, and a later registration is picked up
/// by subsequent `get` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    /// Name of the component depended on.
    pub name: String,
    /// Whether resolution tolerates this dependency being unregistered.
    pub optional: bool,
}

impl DependencySpec {
    /// A mandatory dependency: must be registered before its dependent.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    /// An optional dependency: absent when unregistered.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }
}

// ── Resolved dependencies ────────────────────────────────────────

/// Dependencies handed to a factory, keyed by declared name.
///
/// Absent optional dependencies are present as `None` so a factory can
/// distinguish "declared but unavailable" from a name it never declared.
#[derive(Debug)]
pub struct ResolvedDeps<T> {
    values: HashMap<String, Option<T>>,
}

impl<T> ResolvedDeps<T> {
    fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Look up a resolved dependency. `None` when the dependency was
    /// optional and unregistered, or was never declared.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(|v| v.as_ref())
    }

    /// Look up a dependency the factory cannot work without.
    pub fn require(&self, name: &str) -> anyhow::Result<&T> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("dependency '{name}' was not resolved"))
    }

    /// Whether the named dependency resolved to an instance.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

// ── Resolution context ───────────────────────────────────────────

/// Pre-resolved instances injected into a resolution pass.
///
/// A context hit short-circuits factory invocation for that name, for
/// both the requested component and any of its dependencies.
#[derive(Debug, Clone)]
pub struct ResolutionContext<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for ResolutionContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResolutionContext<T> {
    /// An empty context.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: T) -> Self {
        self.entries.insert(name.into(), value);
        self
    }

    /// Insert or replace an instance.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        self.entries.insert(name.into(), value)
    }

    /// Look up an injected instance.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    /// Whether the context carries an instance for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

// ── Registry ─────────────────────────────────────────────────────

type Factory<T> = Box<dyn Fn(&ResolvedDeps<T>) -> anyhow::Result<T> + Send + Sync>;

struct Registration<T> {
    factory: Factory<T>,
    dependencies: Vec<DependencySpec>,
}

/// Name → factory registry with automatic dependency resolution.
///
/// Registration order is bottom-up: every mandatory dependency must be
/// registered before its dependent, which also makes mandatory cycles
/// unrepresentable at registration time. Cycles reachable through
/// optional dependencies are caught during resolution instead.
pub struct ComponentRegistry<T> {
    components: HashMap<String, Registration<T>>,
}

impl<T> Default for ComponentRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ComponentRegistry<T> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            components: HashMap::new(),
        }
    }

    /// Register a component under a unique name.
    ///
    /// Fails with [`RegistryError::DuplicateName`] if the name is taken,
    /// [`RegistryError::InvalidInput`] on an empty name or dependency
    /// spec, and [`RegistryError::MissingDependency`] listing every
    /// mandatory dependency not yet registered.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
        dependencies: Vec<DependencySpec>,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&ResolvedDeps<T>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidInput(
                "component name must be a non-empty string".into(),
            ));
        }
        if let Some(bad) = dependencies.iter().find(|d| d.name.trim().is_empty()) {
            return Err(RegistryError::InvalidInput(format!(
                "dependency of '{}' has an empty name (optional: {})",
                name, bad.optional,
            )));
        }
        if self.components.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let missing: Vec<String> = dependencies
            .iter()
            .filter(|d| !d.optional && !self.components.contains_key(&d.name))
            .map(|d| d.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(RegistryError::MissingDependency {
                component: name,
                missing,
            });
        }

        tracing::debug!(
            component = %name,
            dependencies = dependencies.len(),
            "component registered"
        );
        self.components.insert(
            name,
            Registration {
                factory: Box::new(factory),
                dependencies,
            },
        );
        Ok(())
    }

    /// Whether a component is registered under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Names of all registered components, sorted for determinism.
    pub fn all_registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.components.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove a component nothing else depends on.
    ///
    /// Returns `false` when the name was never registered. Fails with
    /// [`RegistryError::DependentsExist`] when any other registration
    /// lists `name` in its dependency specs.
    pub fn unregister(&mut self, name: &str) -> Result<bool, RegistryError> {
        if !self.components.contains_key(name) {
            return Ok(false);
        }

        let mut dependents: Vec<String> = self
            .components
            .iter()
            .filter(|(comp, reg)| {
                *comp != name && reg.dependencies.iter().any(|d| d.name == name)
            })
            .map(|(comp, _)| comp.clone())
            .collect();
        dependents.sort();
        if !dependents.is_empty() {
            return Err(RegistryError::DependentsExist {
                name: name.to_string(),
                dependents,
            });
        }

        self.components.remove(name);
        tracing::debug!(component = name, "component unregistered");
        Ok(true)
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        let count = self.components.len();
        self.components.clear();
        tracing::debug!(removed = count, "registry cleared");
    }

    /// Transitive dependency order for `name`: leaves first, ending in
    /// `name`, each component listed exactly once.
    ///
    /// Optional dependencies that are unregistered are skipped;
    /// registered ones are traversed like any other edge. A repeat
    /// visit while still on the DFS stack fails with
    /// [`RegistryError::CircularDependency`] carrying the cycle path.
    pub fn resolve_dependencies(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        if !self.components.contains_key(name) {
            return Err(RegistryError::Unregistered(name.to_string()));
        }

        let mut order = Vec::new();
        let mut resolved = std::collections::HashSet::new();
        let mut visiting = Vec::new();
        self.visit(name, &mut visiting, &mut resolved, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
        resolved: &mut std::collections::HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
        if visiting.iter().any(|v| v == name) {
            let mut cycle = visiting.clone();
            cycle.push(name.to_string());
            return Err(RegistryError::CircularDependency { cycle });
        }
        if resolved.contains(name) {
            return Ok(());
        }

        visiting.push(name.to_string());
        // Registration is guaranteed for the root; dependencies are
        // checked here because optional ones may be absent.
        let deps = self
            .components
            .get(name)
            .map(|r| r.dependencies.as_slice())
            .unwrap_or_default();
        for dep in deps {
            if !self.components.contains_key(&dep.name) {
                if dep.optional {
                    continue;
                }
                return Err(RegistryError::MissingDependency {
                    component: name.to_string(),
                    missing: vec![dep.name.clone()],
                });
            }
            self.visit(&dep.name, visiting, resolved, order)?;
        }
        visiting.pop();
        resolved.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }
}

impl<T: Clone> ComponentRegistry<T> {
    /// Resolve a component instance, injecting its dependencies.
    ///
    /// A context hit for `name` returns the injected value directly
    /// without invoking any factory. Otherwise each declared dependency
    /// resolves in order: context hit → injected value; optional and
    /// unregistered → absent; anything else → recursive `get`. The
    /// factory then runs with the resolved set.
    ///
    /// Nothing is memoized; every call re-resolves and re-invokes.
    pub fn get(&self, name: &str, context: &ResolutionContext<T>) -> Result<T, RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidInput(
                "component name must be a non-empty string".into(),
            ));
        }
        let mut visiting = Vec::new();
        self.instantiate(name, context, &mut visiting)
    }

    fn instantiate(
        &self,
        name: &str,
        context: &ResolutionContext<T>,
        visiting: &mut Vec<String>,
    ) -> Result<T, RegistryError> {
        if let Some(value) = context.get(name) {
            return Ok(value.clone());
        }
        let registration = self
            .components
            .get(name)
            .ok_or_else(|| RegistryError::Unregistered(name.to_string()))?;
        if visiting.iter().any(|v| v == name) {
            let mut cycle = visiting.clone();
            cycle.push(name.to_string());
            return Err(RegistryError::CircularDependency { cycle });
        }

        visiting.push(name.to_string());
        let mut resolved = ResolvedDeps::new();
        for dep in &registration.dependencies {
            let value = if let Some(injected) = context.get(&dep.name) {
                Some(injected.clone())
            } else if dep.optional && !self.components.contains_key(&dep.name) {
                None
            } else {
                Some(self.instantiate(&dep.name, context, visiting)?)
            };
            resolved.values.insert(dep.name.clone(), value);
        }
        visiting.pop();

        let instance =
            (registration.factory)(&resolved).map_err(|source| RegistryError::FactoryFailed {
                name: name.to_string(),
                source,
            })?;
        tracing::trace!(
            component = name,
            dependencies = registration.dependencies.len(),
            "component instantiated"
        );
        Ok(instance)
    }
}

// ── Tests ────────────────────────────────────────────────────────
