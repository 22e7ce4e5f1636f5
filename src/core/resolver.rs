//! Dependency resolution
//!
//! Works out which of the selected local packages depend on each other and
//! orders them so every package comes after the siblings it consumes.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core::package::PackageNode;
use crate::error::ResolverError;

/// Sibling dependency names for each package, aligned with the input
///
/// A package's entry lists the names of the *other* input packages that
/// appear among its declared dependencies.
pub fn sibling_dependencies<T: AsRef<PackageNode>>(packages: &[T]) -> Vec<Vec<String>> {
    packages
        .iter()
        .enumerate()
        .map(|(index, pkg)| {
            let pkg = pkg.as_ref();
            let others: HashSet<&str> = packages
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != index)
                .map(|(_, p)| p.as_ref().name.as_str())
                .filter(|name| !name.is_empty() && *name != pkg.name)
                .collect();
            pkg.dependency_names
                .iter()
                .filter(|name| others.contains(name.as_str()))
                .cloned()
                .collect()
        })
        .collect()
}

/// `package name -> sibling names it depends on`
pub fn dependency_relation<T: AsRef<PackageNode>>(packages: &[T]) -> BTreeMap<String, Vec<String>> {
    packages
        .iter()
        .zip(sibling_dependencies(packages))
        .map(|(pkg, deps)| (pkg.as_ref().name.clone(), deps))
        .collect()
}

/// Order packages so that dependencies precede their consumers
///
/// Starting from the input order, `N` passes each move a package to just
/// before its earliest consumer when that consumer currently comes first.
/// Unrelated packages keep their relative input order. For cyclic input the
/// result is a best-effort order; use [`DependencyGraph::check_acyclic`] to
/// reject such sets.
pub fn resolve<T: AsRef<PackageNode>>(packages: Vec<T>) -> Vec<T> {
    let subs = sibling_dependencies(&packages);
    let mut order: Vec<usize> = (0..packages.len()).collect();

    for _ in 0..packages.len() {
        let snapshot = order.clone();
        for index in snapshot {
            let name = &packages[index].as_ref().name;
            if name.is_empty() {
                continue;
            }
            let Some(current) = order.iter().position(|i| *i == index) else {
                continue;
            };
            let first_consumer = order
                .iter()
                .position(|other| *other != index && subs[*other].contains(name));
            if let Some(consumer) = first_consumer.filter(|c| *c < current) {
                let moved = order.remove(current);
                order.insert(consumer, moved);
            }
        }
    }

    let mut slots: Vec<Option<T>> = packages.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

/// Dependency graph over the sibling relation
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Adjacency list: package -> sibling dependencies
    edges: HashMap<String, Vec<String>>,
    /// All known packages, in insertion order
    nodes: Vec<String>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of a package selection
    pub fn from_packages<T: AsRef<PackageNode>>(packages: &[T]) -> Self {
        let mut graph = Self::new();
        for (pkg, deps) in packages.iter().zip(sibling_dependencies(packages)) {
            graph.add_package(&pkg.as_ref().name, deps);
        }
        graph
    }

    /// Add a package to the graph
    pub fn add_package(&mut self, name: &str, dependencies: Vec<String>) {
        for node in std::iter::once(name).chain(dependencies.iter().map(String::as_str)) {
            if !self.nodes.iter().any(|n| n == node) {
                self.nodes.push(node.to_string());
            }
        }
        self.edges
            .entry(name.to_string())
            .or_default()
            .extend(dependencies);
    }

    /// Compute topological sort (build order)
    ///
    /// Returns packages in order such that dependencies come before dependents.
    pub fn topological_sort(&self) -> Result<Vec<String>, ResolverError> {
        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();
        let mut result = Vec::new();
        let mut path = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node) {
                self.visit(node, &mut visited, &mut temp_visited, &mut result, &mut path)?;
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
        path: &mut Vec<String>,
    ) -> Result<(), ResolverError> {
        if temp_visited.contains(node) {
            // Report only the loop, not the walk that led into it
            let start = path.iter().position(|n| n == node).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(node.to_string());
            return Err(ResolverError::CircularDependency { cycle });
        }

        if visited.contains(node) {
            return Ok(());
        }

        temp_visited.insert(node.to_string());
        path.push(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                self.visit(dep, visited, temp_visited, result, path)?;
            }
        }

        path.pop();
        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());

        Ok(())
    }

    /// Fail with the first cycle found
    pub fn check_acyclic(&self) -> Result<(), ResolverError> {
        self.topological_sort().map(drop)
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators::{acyclic_packages, node};
    use proptest::prelude::*;

    fn names(order: &[PackageNode]) -> Vec<&str> {
        order.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_chain_given_consumer_first_is_reversed() {
        // A depends on B, B depends on C
        let a = PackageNode { name: "A".into(), dependency_names: vec!["B".into()], ..PackageNode::default() };
        let b = PackageNode { name: "B".into(), dependency_names: vec!["C".into()], ..PackageNode::default() };
        let c = PackageNode { name: "C".into(), ..PackageNode::default() };

        let order = resolve(vec![a, b, c]);
        assert_eq!(names(&order), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_unrelated_packages_keep_input_order() {
        let order = resolve(vec![node(3, &[]), node(1, &[]), node(2, &[])]);
        assert_eq!(names(&order), vec!["p3", "p1", "p2"]);
    }

    #[test]
    fn test_already_ordered_input_is_unchanged() {
        let order = resolve(vec![node(0, &[]), node(1, &[0]), node(2, &[1])]);
        assert_eq!(names(&order), vec!["p0", "p1", "p2"]);
    }

    #[test]
    fn test_dependency_moves_before_earliest_consumer() {
        // p1 and p2 both consume p0, which is listed last
        let order = resolve(vec![node(1, &[0]), node(9, &[]), node(2, &[0]), node(0, &[])]);
        assert_eq!(names(&order), vec!["p0", "p1", "p9", "p2"]);
    }

    #[test]
    fn test_sibling_dependencies_ignore_external_and_self() {
        let mut pkg = node(1, &[0, 1]);
        pkg.dependency_names.push("lodash".into());
        let subs = sibling_dependencies(&[pkg, node(0, &[])]);
        assert_eq!(subs[0], vec!["p0".to_string()]);
        assert!(subs[1].is_empty());
    }

    #[test]
    fn test_dependency_relation_by_name() {
        let relation = dependency_relation(&[node(1, &[0]), node(0, &[])]);
        assert_eq!(relation["p1"], vec!["p0".to_string()]);
        assert!(relation["p0"].is_empty());
    }

    #[test]
    fn test_cycle_still_resolves_to_permutation() {
        let order = resolve(vec![node(0, &[1]), node(1, &[0])]);
        let mut got = names(&order);
        got.sort_unstable();
        assert_eq!(got, vec!["p0", "p1"]);
    }

    #[test]
    fn test_simple_dependency_order() {
        let mut graph = DependencyGraph::new();
        graph.add_package("app", vec!["lib".to_string()]);
        graph.add_package("lib", vec![]);

        let order = graph.topological_sort().unwrap();
        let lib_pos = order.iter().position(|x| x == "lib").unwrap();
        let app_pos = order.iter().position(|x| x == "app").unwrap();

        assert!(lib_pos < app_pos, "lib should be built before app");
    }

    #[test]
    fn test_circular_dependency_detection() {
        let mut graph = DependencyGraph::new();
        graph.add_package("a", vec!["b".to_string()]);
        graph.add_package("b", vec!["c".to_string()]);
        graph.add_package("c", vec!["a".to_string()]);

        assert!(graph.has_cycle());
        let err = graph.check_acyclic().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Circular dependency detected: a -> b -> c -> a"
        );
    }

    #[test]
    fn test_cycle_report_skips_entry_path() {
        let graph = DependencyGraph::from_packages(&[node(0, &[1]), node(1, &[2]), node(2, &[1])]);
        match graph.check_acyclic().unwrap_err() {
            ResolverError::CircularDependency { cycle } => {
                assert_eq!(cycle, vec!["p1", "p2", "p1"]);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn test_resolved_order_puts_dependencies_first(packages in acyclic_packages()) {
            let subs = sibling_dependencies(&packages);
            let order = resolve(packages.clone());
            let position = |name: &str| order.iter().position(|p| p.name == name).unwrap();

            for (pkg, deps) in packages.iter().zip(&subs) {
                for dep in deps {
                    prop_assert!(position(dep) < position(&pkg.name));
                }
            }
        }

        #[test]
        fn test_resolved_order_is_permutation(packages in acyclic_packages()) {
            let order = resolve(packages.clone());
            prop_assert_eq!(order.len(), packages.len());

            let mut expected: Vec<_> = packages.iter().map(|p| p.name.clone()).collect();
            let mut got: Vec<_> = order.iter().map(|p| p.name.clone()).collect();
            expected.sort();
            got.sort();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn test_generated_sets_are_acyclic(packages in acyclic_packages()) {
            prop_assert!(!DependencyGraph::from_packages(&packages).has_cycle());
        }
    }
}
