//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    use crate::core::package::PackageNode;

    /// Most packages a generated set contains
    pub const MAX_PACKAGES: usize = 8;

    /// Generate a valid package name (lowercase alphanumeric with hyphens)
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,30}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a scoped or unscoped package name
    pub fn npm_package_name() -> impl Strategy<Value = String> {
        (proptest::option::of("[a-z][a-z0-9]{0,8}"), package_name()).prop_map(
            |(scope, name)| match scope {
                Some(scope) => format!("@{scope}/{name}"),
                None => name,
            },
        )
    }

    /// Generate a valid semver version string
    pub fn semver_version() -> impl Strategy<Value = String> {
        (1u32..100, 0u32..100, 0u32..100)
            .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
    }

    /// A package named `p<index>` depending on the given sibling indices
    pub fn node(index: usize, deps: &[usize]) -> PackageNode {
        PackageNode {
            name: format!("p{index}"),
            version: "1.0.0".to_string(),
            is_valid_package: true,
            dependency_names: deps.iter().map(|d| format!("p{d}")).collect(),
            ..PackageNode::default()
        }
    }

    /// Generate an acyclic package set in shuffled input order
    ///
    /// Package `i` may only depend on packages with a smaller index, and may
    /// also depend on unrelated registry packages.
    pub fn acyclic_packages() -> impl Strategy<Value = Vec<PackageNode>> {
        (
            1..=MAX_PACKAGES,
            prop::collection::vec(prop::collection::vec(any::<bool>(), MAX_PACKAGES), MAX_PACKAGES),
            Just((0..MAX_PACKAGES).collect::<Vec<_>>()).prop_shuffle(),
        )
            .prop_map(|(n, edges, order)| {
                order
                    .into_iter()
                    .filter(|i| *i < n)
                    .map(|i| {
                        let deps: Vec<usize> = (0..i).filter(|j| edges[i][*j]).collect();
                        let mut pkg = node(i, &deps);
                        pkg.dependency_names.push("react".to_string());
                        pkg
                    })
                    .collect()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator_produces_valid_names(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().next().unwrap().is_ascii_lowercase());
        }

        #[test]
        fn test_npm_package_name_scope_shape(name in npm_package_name()) {
            if let Some(rest) = name.strip_prefix('@') {
                prop_assert_eq!(rest.matches('/').count(), 1);
            } else {
                prop_assert!(!name.contains('/'));
            }
        }

        #[test]
        fn test_semver_generator_produces_valid_versions(version in semver_version()) {
            prop_assert!(semver::Version::parse(&version).is_ok());
        }

        #[test]
        fn test_acyclic_packages_only_point_backwards(packages in acyclic_packages()) {
            for pkg in &packages {
                let own: usize = pkg.name[1..].parse().unwrap();
                for dep in pkg.dependency_names.iter().filter(|d| d.starts_with('p')) {
                    let other: usize = dep[1..].parse().unwrap();
                    prop_assert!(other < own);
                }
            }
        }
    }
}
