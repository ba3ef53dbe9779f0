//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Generate a valid unscoped npm package name
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate an optional `@scope`
    pub fn package_scope() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[a-z][a-z0-9]{1,10}".prop_map(|s| format!("@{s}")))
    }

    /// Generate a valid semver version string
    pub fn semver_version() -> impl Strategy<Value = String> {
        (0u32..50, 0u32..50, 0u32..50)
            .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
    }

    /// Generate an `npm ls --json` style `dependencies` object
    ///
    /// Names come from a small pool so the same dependency is reached along
    /// several routes; some nodes lack a version, like unmet peers.
    pub fn dependency_tree() -> impl Strategy<Value = Value> {
        let leaf = (
            prop::sample::select(vec!["a", "b", "c", "d", "@s/e"]),
            proptest::option::weighted(0.85, prop::sample::select(vec!["1.0.0", "2.0.0"])),
        )
            .prop_map(|(name, version)| {
                let mut node = Map::new();
                if let Some(version) = version {
                    node.insert("version".to_string(), Value::String(version.to_string()));
                }
                (name.to_string(), Value::Object(node))
            });

        let node = leaf.prop_recursive(4, 32, 4, |inner| {
            (inner.clone(), prop::collection::vec(inner, 0..4)).prop_map(|((name, mut node), children)| {
                let children: Map<String, Value> = children.into_iter().collect();
                if let Value::Object(map) = &mut node {
                    map.insert("dependencies".to_string(), Value::Object(children));
                }
                (name, node)
            })
        });

        prop::collection::vec(node, 0..6)
            .prop_map(|nodes| Value::Object(nodes.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_shape(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().next().unwrap().is_ascii_lowercase());
        }

        #[test]
        fn test_scope_prefix(scope in package_scope()) {
            if let Some(scope) = scope {
                prop_assert!(scope.starts_with('@'));
            }
        }

        #[test]
        fn test_dependency_tree_is_object(tree in dependency_tree()) {
            prop_assert!(tree.is_object());
        }
    }
}
