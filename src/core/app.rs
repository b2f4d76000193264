//! core::app
//!
//! The parsed application model.
//!
//! # Architecture
//!
//! Parsing produces an [`App`]: the complete set of source files, one
//! [`Package`] per source directory (plus any synthetic packages appended
//! later by the build phase), the subset of root packages that the generated
//! main package must reach, and an index from import path to package
//! position.
//!
//! # Invariants
//!
//! - Import paths are unique across the app.
//! - After [`crate::parser::parse_files`] returns, `packages` is in
//!   topological order: every package appears after all of its transitive
//!   dependencies.
//! - `dependencies` only names packages owned by the same app; imports of
//!   toolchain packages are elided.

use std::collections::HashMap;
use std::path::PathBuf;

/// A parsed source file.
#[derive(Debug, Clone, Default)]
pub struct File {
    /// Path relative to the owning package's base directory. Synthetic files
    /// carry an absolute path under the work directory instead.
    pub name: String,
    /// The package this file declares itself to be.
    pub package_name: String,
    /// Import paths as declared, in source order.
    pub import_paths: Vec<String>,
    /// Whether the file declares a niladic top-level `init`.
    pub has_init: bool,
    /// Whether the file declares the runtime entry `Main`.
    pub has_main: bool,
}

/// One compilable unit, corresponding to one source directory.
#[derive(Debug, Clone, Default)]
pub struct Package {
    /// The forward-slash path under which this package may be imported.
    pub import_path: String,
    /// The source files that form this package.
    pub files: Vec<File>,
    /// What the file names are relative to, if outside the app.
    pub base_dir: Option<PathBuf>,
    /// Import paths of the app-owned packages this directly depends upon,
    /// sorted ascending.
    pub dependencies: Vec<String>,
    /// Whether any file has an init function.
    pub has_init: bool,
    /// Whether any file has the runtime entry `Main`.
    pub has_main: bool,
    /// Whether the import path duplicates a toolchain package name.
    pub dupe: bool,
    /// Whether the package was generated by the driver (main or tree node).
    pub synthetic: bool,
}

/// An entire app: the output of parsing and the input to the build.
#[derive(Debug, Default)]
pub struct App {
    /// The complete set of source files for this app.
    pub files: Vec<File>,
    /// The packages, in topological order once parsing completes.
    pub packages: Vec<Package>,
    /// Import paths of the packages the generated main must reach.
    pub root_packages: Vec<String>,
    /// Index from import path to position in `packages`.
    pub package_index: HashMap<String, usize>,
    /// The import path of the package hosting the runtime entry point.
    pub internal_pkg: Option<String>,
}

impl App {
    /// Look up a package by import path.
    pub fn package(&self, import_path: &str) -> Option<&Package> {
        self.package_index
            .get(import_path)
            .map(|&i| &self.packages[i])
    }

    /// Append a package, keeping the index coherent.
    pub fn push_package(&mut self, pkg: Package) {
        self.package_index
            .insert(pkg.import_path.clone(), self.packages.len());
        self.packages.push(pkg);
    }

    /// Rebuild the import-path index after the package list is reordered.
    pub fn reindex(&mut self) {
        self.package_index = self
            .packages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.import_path.clone(), i))
            .collect();
    }
}
