//! parser::topo
//!
//! Topological ordering of the package list, with concrete cycle reporting.
//!
//! # Invariants
//!
//! - On success the package list is ordered such that X comes before Y
//!   whenever X is a dependency of Y.
//! - On failure the reported cycle is a real path through the dependency
//!   relation, starting at the lexicographically least member of some cycle,
//!   with the start repeated at the end.

use std::collections::{HashMap, HashSet};

use crate::core::app::Package;

/// Sort the packages in dependency order.
///
/// Returns the cycle path on failure.
pub fn topological_sort(packages: &mut [Package]) -> Result<(), Vec<String>> {
    let mut selected: HashSet<String> = HashSet::with_capacity(packages.len());
    let mut start = 0;
    while start < packages.len() {
        // Sweep the working list and move the packages with no unselected
        // dependencies to the front.
        let mut n = start;
        for i in start..packages.len() {
            if packages[i]
                .dependencies
                .iter()
                .all(|dep| selected.contains(dep))
            {
                selected.insert(packages[i].import_path.clone());
                packages.swap(i, n);
                n += 1;
            }
        }
        if n == start {
            // No leaves, so there must be a cycle.
            return Err(find_cycle(&packages[start..]));
        }
        start = n;
    }
    Ok(())
}

/// Find a cycle among the given packages, every one of which is known to be
/// a member of some cycle. The returned path repeats its first element at
/// the end.
fn find_cycle(packages: &[Package]) -> Vec<String> {
    let index: HashMap<&str, &Package> = packages
        .iter()
        .map(|p| (p.import_path.as_str(), p))
        .collect();
    let min = packages
        .iter()
        .map(|p| p.import_path.as_str())
        .min()
        .unwrap_or_default();

    // Walk dependencies from the lexicographically least member until a
    // package repeats; the repeat closes the cycle.
    let mut cycle: Vec<&str> = vec![min];
    let mut seen: HashMap<&str, usize> = HashMap::from([(min, 0)]);
    loop {
        let last = index[cycle[cycle.len() - 1]];
        if let Some(&i) = last
            .dependencies
            .iter()
            .find_map(|dep| seen.get(dep.as_str()))
        {
            let mut path: Vec<String> = cycle[i..].iter().map(|s| s.to_string()).collect();
            path.push(cycle[i].to_string());
            return path;
        }
        // None of last's dependencies are in the walk yet, so extend it with
        // one that is known to lie in a cycle. Such a dependency always
        // exists, because otherwise last would not be a cycle member.
        let Some(dep) = last
            .dependencies
            .iter()
            .find(|dep| index.contains_key(dep.as_str()))
        else {
            let mut path: Vec<String> = cycle.iter().map(|s| s.to_string()).collect();
            path.push(cycle[0].to_string());
            return path;
        };
        seen.insert(dep, cycle.len());
        cycle.push(dep);
    }
}

/// Whether the import path contains an `internal` path element.
pub fn find_internal(path: &str) -> bool {
    path == "internal"
        || path.starts_with("internal/")
        || path.ends_with("/internal")
        || path.contains("/internal/")
}

/// Whether `importer` may import the internal package `path`.
///
/// The import is legal only when the importer's path begins with the prefix
/// of `path` up to, but not including, its last `internal` element.
pub fn internal_import_allowed(importer: &str, path: &str) -> bool {
    let elements: Vec<&str> = path.split('/').collect();
    let Some(pos) = elements.iter().rposition(|e| *e == "internal") else {
        return true;
    };
    let prefix = elements[..pos].join("/");
    prefix.is_empty() || importer == prefix || importer.starts_with(&format!("{prefix}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(path: &str, deps: &[&str]) -> Package {
        Package {
            import_path: path.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..Package::default()
        }
    }

    mod sorting {
        use super::*;

        #[test]
        fn orders_dependencies_first() {
            let mut pkgs = vec![
                pkg("app/foo", &["app/bar"]),
                pkg("app/bar", &[]),
                pkg("app/baz", &["app/foo", "app/bar"]),
            ];
            topological_sort(&mut pkgs).unwrap();

            let order: Vec<&str> = pkgs.iter().map(|p| p.import_path.as_str()).collect();
            let pos = |p: &str| order.iter().position(|x| *x == p).unwrap();
            assert!(pos("app/bar") < pos("app/foo"));
            assert!(pos("app/foo") < pos("app/baz"));
        }

        #[test]
        fn empty_list_sorts() {
            let mut pkgs: Vec<Package> = vec![];
            assert!(topological_sort(&mut pkgs).is_ok());
        }

        #[test]
        fn diamond_sorts() {
            let mut pkgs = vec![
                pkg("top", &["left", "right"]),
                pkg("left", &["base"]),
                pkg("right", &["base"]),
                pkg("base", &[]),
            ];
            topological_sort(&mut pkgs).unwrap();
            assert_eq!(pkgs[0].import_path, "base");
            assert_eq!(pkgs[3].import_path, "top");
        }
    }

    mod cycles {
        use super::*;

        #[test]
        fn two_cycle_reports_path() {
            let mut pkgs = vec![pkg("a", &["b"]), pkg("b", &["a"])];
            let cycle = topological_sort(&mut pkgs).unwrap_err();
            assert_eq!(cycle, vec!["a", "b", "a"]);
        }

        #[test]
        fn cycle_starts_at_lexicographic_minimum() {
            let mut pkgs = vec![pkg("z", &["m"]), pkg("m", &["z"])];
            let cycle = topological_sort(&mut pkgs).unwrap_err();
            assert_eq!(cycle.first().map(String::as_str), Some("m"));
            assert_eq!(cycle.first(), cycle.last());
        }

        #[test]
        fn self_import_is_a_cycle() {
            let mut pkgs = vec![pkg("solo", &["solo"])];
            let cycle = topological_sort(&mut pkgs).unwrap_err();
            assert_eq!(cycle, vec!["solo", "solo"]);
        }

        #[test]
        fn cycle_amid_acyclic_packages() {
            let mut pkgs = vec![
                pkg("free", &[]),
                pkg("a", &["b"]),
                pkg("b", &["c"]),
                pkg("c", &["a"]),
            ];
            let cycle = topological_sort(&mut pkgs).unwrap_err();
            assert_eq!(cycle, vec!["a", "b", "c", "a"]);
        }
    }

    mod internal_rule {
        use super::*;

        #[test]
        fn detects_internal_elements() {
            assert!(find_internal("internal"));
            assert!(find_internal("internal/race"));
            assert!(find_internal("x/y/internal"));
            assert!(find_internal("x/y/internal/k"));
            assert!(!find_internal("x/internals/k"));
            assert!(!find_internal("x/y/k"));
        }

        #[test]
        fn sibling_subtree_is_allowed() {
            assert!(internal_import_allowed("x/y", "x/y/internal/k"));
            assert!(internal_import_allowed("x/y/w", "x/y/internal/k"));
        }

        #[test]
        fn foreign_subtree_is_rejected() {
            assert!(!internal_import_allowed("x/z", "x/y/internal/k"));
            assert!(!internal_import_allowed("x", "x/y/internal/k"));
            assert!(!internal_import_allowed("x/yy", "x/y/internal/k"));
        }

        #[test]
        fn rooted_internal_is_shared() {
            assert!(internal_import_allowed("anything", "internal/shared"));
        }
    }
}
