//! synth
//!
//! Generated sources: the synthetic main package, per-package extra-imports
//! files, and the bounded import tree.
//!
//! # Import tree
//!
//! The synthetic main must transitively import every root package. To avoid
//! a single generated file with an unbounded number of imports, tree-node
//! packages are introduced, each blank-importing at most
//! [`crate::config::MAX_ROOT_PACKAGE_TREE_IMPORTS_PER_FILE`] packages, until
//! the list main imports directly fits the same bound.

use std::fmt::Write as _;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::Config;
use crate::core::app::{App, File, Package};

/// Errors from writing generated sources.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("failed creating directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed writing {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Render the synthetic main package source.
///
/// The file blank-imports every root package and either hands control to the
/// entry package's `Main` or serves a default health-check handler.
pub fn make_main(app: &App) -> String {
    let mut out = String::new();
    out.push_str("// Code generated by go-app-builder. DO NOT EDIT.\n\n");
    out.push_str("package main\n\n");

    match &app.internal_pkg {
        Some(entry) => {
            let _ = writeln!(out, "import internal {entry:?}");
        }
        None => {
            out.push_str("import (\n\t\"fmt\"\n\t\"net/http\"\n\t\"os\"\n)\n");
        }
    }

    if !app.root_packages.is_empty() {
        out.push_str("\nimport (\n");
        for root in &app.root_packages {
            let _ = writeln!(out, "\t_ {root:?}");
        }
        out.push_str(")\n");
    }

    out.push_str("\nfunc main() {\n");
    match &app.internal_pkg {
        Some(_) => out.push_str("\tinternal.Main()\n"),
        None => {
            out.push_str(
                "\thttp.HandleFunc(\"/_ah/health\", func(w http.ResponseWriter, r *http.Request) {\n",
            );
            out.push_str("\t\tfmt.Fprint(w, \"ok\")\n");
            out.push_str("\t})\n");
            out.push_str("\tport := os.Getenv(\"PORT\")\n");
            out.push_str("\tif port == \"\" {\n\t\tport = \"8080\"\n\t}\n");
            out.push_str("\tif err := http.ListenAndServe(\":\"+port, nil); err != nil {\n");
            out.push_str("\t\tpanic(err)\n\t}\n");
        }
    }
    out.push_str("}\n");
    out
}

/// Render a file that blank-imports `imports` from within `package_name`.
pub fn make_extra_imports(package_name: &str, imports: &[String]) -> String {
    let mut out = String::new();
    out.push_str("// Code generated by go-app-builder. DO NOT EDIT.\n\n");
    let _ = writeln!(out, "package {package_name}\n");
    out.push_str("import (\n");
    for imp in imports {
        let _ = writeln!(out, "\t_ {imp:?}");
    }
    out.push_str(")\n");
    out
}

/// Bound the fan-in of the synthetic main package.
///
/// Takes the unbounded list of root packages and, while it exceeds `limit`,
/// replaces `limit` of them with a new synthetic tree-node package that
/// blank-imports exactly those packages. Source files for the tree nodes are
/// written under the work directory.
///
/// Returns the packages created and the new root list for main to import.
/// Files already written are removed again if a later write fails.
pub fn construct_root_package_tree(
    root_packages: &[String],
    limit: usize,
    cfg: &Config,
) -> Result<(Vec<Package>, Vec<String>), SynthError> {
    let mut new_packages: Vec<Package> = Vec::new();
    let mut new_roots: Vec<String> = root_packages.to_vec();
    let mut written: Vec<PathBuf> = Vec::new();
    let mut count = 0;

    let result = (|| {
        while new_roots.len() > limit {
            count += 1;
            let package_name = format!("_import_tree{count}");
            let dir = cfg.work_dir.join(&package_name);
            let file_path = dir.join(format!("_go_main_tree{count}.go"));

            let deps: Vec<String> = new_roots.drain(..limit).collect();
            new_roots.push(package_name.clone());

            let node_src = make_extra_imports(&package_name, &deps);
            std::fs::create_dir_all(&dir).map_err(|source| SynthError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            std::fs::write(&file_path, node_src).map_err(|source| SynthError::Write {
                path: file_path.clone(),
                source,
            })?;
            written.push(file_path.clone());

            new_packages.push(Package {
                import_path: package_name.clone(),
                files: vec![File {
                    name: file_path.to_string_lossy().to_string(),
                    package_name,
                    ..File::default()
                }],
                dependencies: deps,
                synthetic: true,
                ..Package::default()
            });
        }
        Ok(())
    })();

    if let Err(err) = result {
        for path in &written {
            let _ = std::fs::remove_file(path);
        }
        return Err(err);
    }
    Ok((new_packages, new_roots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(work_dir: PathBuf) -> Config {
        Config {
            api_version: "go1".into(),
            app_base: ".".into(),
            arch: "6".into(),
            binary_name: "_go_app.bin".into(),
            dynamic: false,
            extra_imports: vec![],
            gc_flags: vec![],
            gopath: vec![],
            goroot: "/goroot".into(),
            ld_flags: vec![],
            modern_toolchain: false,
            nobuild_files: None,
            parallelism: 1,
            dupe_whitelist: HashSet::new(),
            trampoline: None,
            trampoline_flags: vec![],
            allow_unsafe: false,
            verbose: false,
            vm: false,
            work_dir,
        }
    }

    mod templates {
        use super::*;

        #[test]
        fn main_with_entry_calls_into_it() {
            let app = App {
                root_packages: vec!["app/foo".into()],
                internal_pkg: Some("appengine_internal".into()),
                ..App::default()
            };
            let src = make_main(&app);
            assert!(src.contains("package main"));
            assert!(src.contains("import internal \"appengine_internal\""));
            assert!(src.contains("\t_ \"app/foo\""));
            assert!(src.contains("internal.Main()"));
            assert!(!src.contains("net/http"));
        }

        #[test]
        fn main_without_entry_serves_health_checks() {
            let app = App {
                root_packages: vec!["app/foo".into(), "app/bar".into()],
                internal_pkg: None,
                ..App::default()
            };
            let src = make_main(&app);
            assert!(src.contains("net/http"));
            assert!(src.contains("/_ah/health"));
            assert!(src.contains("\"ok\""));
            assert!(src.contains("os.Getenv(\"PORT\")"));
            assert!(src.contains("8080"));
            assert!(src.contains("\t_ \"app/foo\""));
            assert!(src.contains("\t_ \"app/bar\""));
        }

        #[test]
        fn extra_imports_blank_imports_each_path() {
            let src = make_extra_imports("foo", &["a/b".into(), "c".into()]);
            assert!(src.contains("package foo"));
            assert!(src.contains("\t_ \"a/b\""));
            assert!(src.contains("\t_ \"c\""));
        }
    }

    mod import_tree {
        use super::*;

        fn roots(n: usize) -> Vec<String> {
            (1..=n).map(|i| format!("r{i}")).collect()
        }

        /// Follow tree-node dependencies down to the original roots.
        fn closure(new_packages: &[Package], list: &[String]) -> HashSet<String> {
            let mut out = HashSet::new();
            let mut stack: Vec<String> = list.to_vec();
            while let Some(p) = stack.pop() {
                match new_packages.iter().find(|n| n.import_path == p) {
                    Some(node) => stack.extend(node.dependencies.iter().cloned()),
                    None => {
                        out.insert(p);
                    }
                }
            }
            out
        }

        #[test]
        fn small_root_lists_are_untouched() {
            let tmp = tempfile::tempdir().unwrap();
            let cfg = config(tmp.path().to_path_buf());
            let (new_packages, new_roots) =
                construct_root_package_tree(&roots(2), 2, &cfg).unwrap();
            assert!(new_packages.is_empty());
            assert_eq!(new_roots, roots(2));
        }

        #[test]
        fn five_roots_with_limit_two_build_three_nodes() {
            let tmp = tempfile::tempdir().unwrap();
            let cfg = config(tmp.path().to_path_buf());
            let (new_packages, new_roots) =
                construct_root_package_tree(&roots(5), 2, &cfg).unwrap();

            assert_eq!(new_packages.len(), 3);
            assert_eq!(new_roots.len(), 2);
            for node in &new_packages {
                assert!(node.dependencies.len() <= 2);
                assert!(node.synthetic);
            }
            // The transitive closure still covers every original root.
            let covered = closure(&new_packages, &new_roots);
            assert_eq!(covered, roots(5).into_iter().collect::<HashSet<_>>());
        }

        #[test]
        fn tree_node_sources_are_written() {
            let tmp = tempfile::tempdir().unwrap();
            let cfg = config(tmp.path().to_path_buf());
            let (new_packages, _) = construct_root_package_tree(&roots(5), 2, &cfg).unwrap();

            for node in &new_packages {
                let file = &node.files[0];
                let src = std::fs::read_to_string(&file.name).unwrap();
                assert!(src.contains(&format!("package {}", node.import_path)));
                for dep in &node.dependencies {
                    assert!(src.contains(&format!("_ {dep:?}")));
                }
            }
        }

        #[test]
        fn no_generated_file_exceeds_the_limit() {
            let tmp = tempfile::tempdir().unwrap();
            let cfg = config(tmp.path().to_path_buf());
            let limit = 3;
            let (new_packages, new_roots) =
                construct_root_package_tree(&roots(17), limit, &cfg).unwrap();

            assert!(new_roots.len() <= limit);
            for node in &new_packages {
                assert!(node.dependencies.len() <= limit);
            }
            let covered = closure(&new_packages, &new_roots);
            assert_eq!(covered.len(), 17);
        }
    }
}
