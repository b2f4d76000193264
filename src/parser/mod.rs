//! parser
//!
//! Parses the named source files, deduces their package structure, and
//! returns the dependency DAG as an [`App`].
//!
//! # Pipeline
//!
//! ```text
//! scan -> parse files -> assemble packages -> resolve overlay ->
//!     select entry -> link dependencies -> sort topologically
//! ```
//!
//! # Invariants
//!
//! - Each source directory yields at most one package; mixed package names
//!   are fatal.
//! - No package may be named `main`.
//! - A package whose import path duplicates a standard package is admitted
//!   only when whitelisted, and is flagged as a dupe.
//! - The returned package list is a topological order of the dependency
//!   relation; a cycle is fatal and reported with a concrete path.

pub mod gopath;
pub mod lint;
pub mod scan;
pub mod source;
pub mod stdlib;
pub mod topo;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::core::app::{App, File, Package};

use source::SourceError;
use stdlib::StdOracle;

/// If this magic string occurs in a file with a niladic `Main`, and the
/// file's package is `internal`, that package hosts the runtime entry point.
pub const MAGIC_INTERNAL_MAIN: &str =
    "The gophers party all night; the rabbits provide the beats.";

/// A list of per-file errors, displayed one per line.
#[derive(Debug)]
pub struct SourceErrorList(pub Vec<SourceError>);

impl From<Vec<SourceError>> for SourceErrorList {
    fn from(errors: Vec<SourceError>) -> Self {
        Self(errors)
    }
}

impl SourceErrorList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SourceErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
            first = false;
        }
        Ok(())
    }
}

/// Errors from parsing and package assembly.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A positional path with no usable enclosing directory.
    #[error("bad filename {0:?}")]
    BadFilename(String),

    /// Two files in one directory declare different packages.
    #[error("failed parsing dir {dir}: found packages {first} and {second}")]
    MixedPackages {
        dir: String,
        first: String,
        second: String,
    },

    /// A package may not be named `main`.
    #[error("top-level main package is forbidden")]
    TopLevelMain,

    /// Import path collides with a standard package and is not whitelisted.
    #[error("package {0:?} has the same name as a standard package")]
    StandardDupe(String),

    /// An import string failed validation.
    #[error("parser: bad import {path:?} in {file}")]
    BadImport { path: String, file: String },

    /// An import string from an overlay package failed validation.
    #[error("parser: bad import {path:?} in {file} from GOPATH")]
    BadOverlayImport { path: String, file: String },

    /// The internal-visibility rule was violated.
    #[error("package {importer:?} cannot import internal package {path:?}")]
    InternalImport { importer: String, path: String },

    /// The dependency relation contains a cycle.
    #[error("parser: cyclic dependency graph: {0}")]
    Cycle(String),

    /// More than one package hosts the runtime entry point.
    #[error("duplicate internal.Main in {0:?} and {1:?}")]
    DuplicateMain(String, String),

    /// An overlay package supplies a file that is also part of the app.
    #[error("app file {0} conflicts with same file imported from GOPATH")]
    OverlayConflict(String),

    /// A required overlay package lost all of its files to the nobuild
    /// filter.
    #[error("package {0} required, but all its files were excluded by nobuild_files")]
    AllExcluded(String),

    /// Scan or lint failures, one per line.
    #[error("{0}")]
    Source(SourceErrorList),

    #[error("failed reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Validate an import path string.
///
/// Rejects empty and overlong strings, absolute paths, parent references,
/// characters outside the legal set, and the reserved `syscall`/`unsafe`
/// paths unless the VM runtime permits them.
pub fn check_import(path: &str, vm: bool) -> bool {
    static LEGAL: OnceLock<Regex> = OnceLock::new();
    let legal = LEGAL.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_\-./~+]+$").expect("static regex"));

    if path.is_empty() || path.len() > 1024 {
        return false;
    }
    if Path::new(path).is_absolute() || path.contains("..") {
        return false;
    }
    if !legal.is_match(path) {
        return false;
    }
    if path == "syscall" || path == "unsafe" {
        // VM apps may import "syscall" and "unsafe".
        return vm;
    }
    true
}

/// Parse the named files and return the dependency DAG as an [`App`].
///
/// Elements of `filenames` are relative to the app base.
pub fn parse_files(cfg: &Config, filenames: &[String]) -> Result<App, ParseError> {
    let oracle = StdOracle::new(cfg);
    let mut app = App::default();
    if !cfg.vm {
        app.internal_pkg = Some("appengine_internal".to_string());
    }

    // Scan and parse the app's own sources, one package per directory.
    let scanned = scan::scan_sources(cfg, filenames)?;
    for dir in scanned {
        let mut files = Vec::new();
        for (name, src) in &dir.files {
            let file = parse_app_file(cfg, &oracle, name, src)?;
            files.push(file);
        }
        if let Some(w) = files.windows(2).find(|w| w[0].package_name != w[1].package_name) {
            return Err(ParseError::MixedPackages {
                dir: dir.dir,
                first: w[0].package_name.clone(),
                second: w[1].package_name.clone(),
            });
        }

        let import_path = if dir.dir == "." {
            top_level_package_name()
        } else {
            dir.dir.replace('\\', "/")
        };
        if import_path == "main" {
            return Err(ParseError::TopLevelMain);
        }
        let mut pkg = Package {
            import_path: import_path.clone(),
            ..Package::default()
        };
        if oracle.is_standard(&import_path) {
            if !cfg.dupe_whitelist.contains(&import_path) {
                return Err(ParseError::StandardDupe(import_path));
            }
            pkg.dupe = true;
        }
        for f in &files {
            pkg.has_init = pkg.has_init || f.has_init;
            pkg.has_main = pkg.has_main || f.has_main;
        }
        app.files.extend(files.iter().cloned());
        pkg.files = files;
        if pkg.has_init || cfg.vm {
            app.root_packages.push(pkg.import_path.clone());
        }
        app.push_package(pkg);
    }

    // Pull in whatever the overlay provides for imports we don't own.
    if !cfg.gopath.is_empty() {
        let conflicts = gopath::app_files_in_overlay(cfg, &app);
        gopath::add_from_overlay(&mut app, cfg, &oracle, &conflicts)?;
    }

    // Select the runtime entry package.
    if app.internal_pkg.is_none() {
        let mut entry: Option<String> = None;
        for pkg in &app.packages {
            if !pkg.has_main {
                continue;
            }
            if let Some(prev) = &entry {
                return Err(ParseError::DuplicateMain(
                    prev.clone(),
                    pkg.import_path.clone(),
                ));
            }
            entry = Some(pkg.import_path.clone());
        }
        app.internal_pkg = entry;
    }
    debug!(entry = ?app.internal_pkg, "entry package selected");

    // Populate dependency lists; standard-library imports are elided.
    for i in 0..app.packages.len() {
        let importer = app.packages[i].import_path.clone();
        let imports: BTreeSet<String> = app.packages[i]
            .files
            .iter()
            .flat_map(|f| f.import_paths.iter().cloned())
            .collect();
        let mut deps = Vec::new();
        for path in imports {
            if app.package_index.contains_key(&path) {
                if topo::find_internal(&path) && !topo::internal_import_allowed(&importer, &path)
                {
                    return Err(ParseError::InternalImport {
                        importer,
                        path,
                    });
                }
                deps.push(path);
            } else if topo::find_internal(&path) {
                // A file declared an internal import we don't know; it can
                // only be someone else's internal package.
                return Err(ParseError::InternalImport {
                    importer,
                    path,
                });
            }
        }
        app.packages[i].dependencies = deps;
    }

    topo::topological_sort(&mut app.packages).map_err(|cycle| ParseError::Cycle(cycle.join(" -> ")))?;
    app.reindex();

    Ok(app)
}

/// Parse one app source file: imports are validated, the lint pass runs, and
/// the runtime entry markers are evaluated.
fn parse_app_file(
    cfg: &Config,
    oracle: &StdOracle,
    name: &str,
    src: &str,
) -> Result<File, ParseError> {
    let parsed =
        source::parse_source(name, src).map_err(|e| ParseError::Source(vec![e].into()))?;

    for imp in &parsed.imports {
        if !check_import(&imp.path, cfg.vm) {
            return Err(ParseError::BadImport {
                path: imp.path.clone(),
                file: name.to_string(),
            });
        }
    }

    // Check for unkeyed struct literals of standard-package types.
    let lint_errors = lint::check_composite_lits(name, &parsed, &|p| oracle.is_standard(p));
    if !lint_errors.is_empty() {
        return Err(ParseError::Source(lint_errors.into()));
    }

    let has_main = cfg.vm
        && parsed.package_name == "internal"
        && parsed.has_niladic_main
        && src.contains(MAGIC_INTERNAL_MAIN);

    Ok(File {
        name: name.to_string(),
        package_name: parsed.package_name,
        import_paths: parsed.imports.into_iter().map(|imp| imp.path).collect(),
        has_init: parsed.has_init,
        has_main,
    })
}

/// Generate a package name for top-level sources. Seeded from the clock, as
/// ordinary builds never reach this.
fn top_level_package_name() -> String {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);
    format!("main{:05}", rng.gen_range(0..100_000))
}
