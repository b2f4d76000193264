//! parser::gopath
//!
//! Overlay package resolution.
//!
//! After the app's own packages are known, imports that are neither standard
//! nor app-owned are resolved from the overlay search path. The package list
//! grows during iteration, so the closure is computed with an index-into-slice
//! worklist rather than a recursive visitor; termination is a length
//! convergence check.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::Config;
use crate::core::app::{App, File, Package};

use super::scan::should_build;
use super::source::parse_source;
use super::stdlib::StdOracle;
use super::{check_import, ParseError, MAGIC_INTERNAL_MAIN};

/// The set of app files that live inside the overlay tree, in
/// overlay-relative forward-slash form.
///
/// When the app base lies under an overlay `src` directory, an overlay
/// package must not supply a file that is also part of the app; the returned
/// set is what that check consults. Empty when the app is not in the overlay.
pub fn app_files_in_overlay(cfg: &Config, app: &App) -> HashSet<String> {
    let mut base_rel = None;
    for entry in &cfg.gopath {
        if let Ok(rel) = cfg.app_base.strip_prefix(entry.join("src")) {
            if !rel.as_os_str().is_empty() {
                base_rel = Some(slash_path(rel));
                break;
            }
        }
    }
    let Some(base_rel) = base_rel else {
        return HashSet::new();
    };

    app.files
        .iter()
        .map(|f| format!("{}/{}", base_rel, f.name.replace('\\', "/")))
        .collect()
}

/// Resolve the transitive overlay closure of every import seen so far.
pub fn add_from_overlay(
    app: &mut App,
    cfg: &Config,
    oracle: &StdOracle,
    conflicts: &HashSet<String>,
) -> Result<(), ParseError> {
    let mut warned: HashSet<String> = HashSet::new();
    let mut i = 0;
    // app.packages grows during this loop.
    while i < app.packages.len() {
        let imports: Vec<(String, String)> = app.packages[i]
            .files
            .iter()
            .flat_map(|f| {
                f.import_paths
                    .iter()
                    .map(|p| (p.clone(), f.name.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (path, file) in imports {
            if !check_import(&path, cfg.vm) {
                return Err(ParseError::BadOverlayImport { path, file });
            }
            if oracle.is_standard(&path) || app.package_index.contains_key(&path) {
                continue;
            }
            let resolved = find_overlay_dir(cfg, &path)
                .map(|dir| import_overlay_package(cfg, conflicts, &path, &dir))
                .transpose()?
                .flatten();
            match resolved {
                Some(pkg) => app.push_package(pkg),
                None => {
                    if warned.insert(path.clone()) {
                        warn!("Can't find package {path:?} in $GOPATH");
                    }
                }
            }
        }
        i += 1;
    }
    Ok(())
}

/// Locate the source directory for an overlay import path.
fn find_overlay_dir(cfg: &Config, path: &str) -> Option<PathBuf> {
    for entry in &cfg.gopath {
        let mut dir = entry.join("src");
        for element in path.split('/') {
            dir.push(element);
        }
        if dir.is_dir() {
            return Some(dir);
        }
    }
    None
}

/// Import one overlay package from its source directory.
///
/// Returns `Ok(None)` when the directory holds no buildable files at all, in
/// which case the caller treats the import as unresolvable. An empty package
/// caused by the nobuild filter is fatal instead: the package is required.
fn import_overlay_package(
    cfg: &Config,
    conflicts: &HashSet<String>,
    path: &str,
    dir: &Path,
) -> Result<Option<Package>, ParseError> {
    let tags = cfg.build_tags();
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map_err(|source| ParseError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let keep = name.ends_with(".go")
                && !name.ends_with("_test.go")
                && !name.starts_with('_')
                && !name.starts_with('.');
            keep.then_some(name)
        })
        .collect();
    names.sort();

    // Tag selection and the app-collision check come first; the nobuild
    // filter applies to the files the toolchain would otherwise build.
    let mut selected: Vec<(String, String)> = Vec::new();
    for name in names {
        let full = dir.join(&name);
        let src = std::fs::read_to_string(&full).map_err(|source| ParseError::Io {
            path: full.clone(),
            source,
        })?;
        if !should_build(&src, &tags) {
            continue;
        }
        if conflicts.contains(&format!("{path}/{name}")) {
            return Err(ParseError::OverlayConflict(name));
        }
        selected.push((name, src));
    }
    if selected.is_empty() {
        return Ok(None);
    }

    let mut files = Vec::new();
    let mut pkg_has_main = false;
    let mut package_name: Option<String> = None;
    for (name, src) in selected {
        if let Some(re) = &cfg.nobuild_files {
            if re.is_match(&format!("{path}/{name}")) {
                continue;
            }
        }
        let parsed = parse_source(&name, &src).map_err(|e| ParseError::Source(vec![e].into()))?;
        match &package_name {
            None => package_name = Some(parsed.package_name.clone()),
            Some(existing) if *existing != parsed.package_name => {
                return Err(ParseError::MixedPackages {
                    dir: path.to_string(),
                    first: existing.clone(),
                    second: parsed.package_name.clone(),
                });
            }
            Some(_) => {}
        }
        let has_main = cfg.vm
            && parsed.package_name == "internal"
            && parsed.has_niladic_main
            && src.contains(MAGIC_INTERNAL_MAIN);
        pkg_has_main = pkg_has_main || has_main;
        files.push(File {
            name,
            package_name: parsed.package_name.clone(),
            import_paths: parsed.imports.into_iter().map(|imp| imp.path).collect(),
            has_init: parsed.has_init,
            has_main,
        });
    }
    if files.is_empty() {
        return Err(ParseError::AllExcluded(path.to_string()));
    }
    Ok(Some(Package {
        import_path: path.to_string(),
        files,
        base_dir: Some(dir.to_path_buf()),
        has_main: pkg_has_main,
        ..Package::default()
    }))
}

fn slash_path(p: &Path) -> String {
    p.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
