//! Dependency validation using topological sort with DFS
//!
//! A missing dependency excludes the dependent bundle (and, transitively,
//! anything depending on it); every member of a cycle is excluded.
//! Unrelated bundles are unaffected. The resolver also retains the
//! dependency graph so the resolution engine can apply the runtime
//! disable cascade.

use std::collections::{BTreeMap, HashMap, HashSet};

use trellis_core::error::Error;
use trellis_core::types::BundleDescriptor;

/// Immutable bundle dependency graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    deps: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build a graph from descriptors
    pub fn new(descriptors: &[BundleDescriptor]) -> Self {
        let mut deps = BTreeMap::new();
        for descriptor in descriptors {
            deps.insert(
                descriptor.id().to_string(),
                descriptor.dependencies.clone(),
            );
        }
        Self { deps }
    }

    /// Whether the graph knows this bundle
    pub fn contains(&self, bundle_id: &str) -> bool {
        self.deps.contains_key(bundle_id)
    }

    /// Direct dependencies of a bundle
    pub fn dependencies_of(&self, bundle_id: &str) -> &[String] {
        self.deps.get(bundle_id).map(|d| d.as_slice()).unwrap_or(&[])
    }

    /// All transitive dependencies of a bundle (excluding itself)
    ///
    /// Cycles are tolerated here; validation has already rejected them
    /// for loaded bundles.
    pub fn transitive_dependencies(&self, bundle_id: &str) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut stack: Vec<&str> = self
            .dependencies_of(bundle_id)
            .iter()
            .map(|s| s.as_str())
            .collect();
        while let Some(dep) = stack.pop() {
            if result.insert(dep.to_string()) {
                stack.extend(self.dependencies_of(dep).iter().map(|s| s.as_str()));
            }
        }
        result
    }
}

/// Outcome of validating a set of descriptors
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    /// Bundle ids safe to load, dependencies before dependents
    pub ordered: Vec<String>,

    /// Per-bundle exclusion errors
    pub errors: Vec<(String, Error)>,
}

/// Dependency resolver using DFS-based topological sort
pub struct DependencyResolver {
    graph: DependencyGraph,
}

impl DependencyResolver {
    pub fn new(descriptors: &[BundleDescriptor]) -> Self {
        Self {
            graph: DependencyGraph::new(descriptors),
        }
    }

    /// Consume the resolver and keep the graph for runtime queries
    pub fn into_graph(self) -> DependencyGraph {
        self.graph
    }

    /// Validate all bundles, producing a load order and exclusions
    pub fn validate(&self) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let mut excluded: HashMap<String, Error> = HashMap::new();

        // Pass 1: cycles. Every member of a cycle is excluded.
        for bundle in self.graph.deps.keys() {
            if excluded.contains_key(bundle) {
                continue;
            }
            let mut visiting = Vec::new();
            self.find_cycle(bundle, &mut visiting, &mut excluded);
        }

        // Pass 2: missing dependencies, cascading through dependents.
        // Iterate to a fixpoint so a bundle depending on an excluded
        // bundle is itself excluded.
        loop {
            let mut changed = false;
            for (bundle, deps) in &self.graph.deps {
                if excluded.contains_key(bundle) {
                    continue;
                }
                for dep in deps {
                    if !self.graph.contains(dep) || excluded.contains_key(dep) {
                        excluded.insert(
                            bundle.clone(),
                            Error::missing_dependency(bundle.clone(), dep.clone()),
                        );
                        changed = true;
                        break;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        // Topological order for the survivors (BTreeMap keys keep this
        // deterministic across runs).
        let mut seen = HashSet::new();
        for bundle in self.graph.deps.keys() {
            if !excluded.contains_key(bundle) {
                self.visit(bundle, &excluded, &mut seen, &mut outcome.ordered);
            }
        }

        let mut errors: Vec<(String, Error)> = excluded.into_iter().collect();
        errors.sort_by(|a, b| a.0.cmp(&b.0));
        outcome.errors = errors;
        outcome
    }

    /// DFS cycle detection; marks every member of a found cycle
    fn find_cycle(
        &self,
        bundle: &str,
        visiting: &mut Vec<String>,
        excluded: &mut HashMap<String, Error>,
    ) {
        if let Some(pos) = visiting.iter().position(|b| b == bundle) {
            let cycle: Vec<String> = visiting[pos..].to_vec();
            let rendered = format!("{} -> {}", cycle.join(" -> "), bundle);
            for member in cycle {
                excluded
                    .entry(member)
                    .or_insert_with(|| Error::circular_dependency(rendered.clone()));
            }
            return;
        }

        visiting.push(bundle.to_string());
        for dep in self.graph.dependencies_of(bundle) {
            if self.graph.contains(dep) {
                self.find_cycle(dep, visiting, excluded);
            }
        }
        visiting.pop();
    }

    /// DFS post-order visit: dependencies land before dependents
    fn visit(
        &self,
        bundle: &str,
        excluded: &HashMap<String, Error>,
        seen: &mut HashSet<String>,
        ordered: &mut Vec<String>,
    ) {
        if seen.contains(bundle) || excluded.contains_key(bundle) {
            return;
        }
        seen.insert(bundle.to_string());
        for dep in self.graph.dependencies_of(bundle) {
            self.visit(dep, excluded, seen, ordered);
        }
        ordered.push(bundle.to_string());
    }
}
