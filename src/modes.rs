//! modes
//!
//! Alternate output modes. Each is mutually exclusive with a build: it
//! prints to the given writer and the driver exits.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::core::app::App;

/// Errors from the alternate modes.
#[derive(Debug, Error)]
pub enum ModeError {
    #[error("failed reading {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed writing output: {0}")]
    Io(#[from] std::io::Error),
}

/// Print one line per overlay file, mapping the app-relative path to its
/// filesystem location.
///
/// The app-relative half always uses forward slash regardless of host; the
/// consumer on the other side of the pipe only deals with those.
pub fn print_extra_files(w: &mut impl Write, app: &App) -> Result<(), ModeError> {
    for pkg in &app.packages {
        let Some(base_dir) = &pkg.base_dir else {
            continue; // app package
        };
        for f in &pkg.files {
            let rel = format!("{}/{}", pkg.import_path, f.name.replace('\\', "/"));
            let dst = base_dir.join(&f.name);
            writeln!(w, "{}|{}", rel, dst.display())?;
        }
    }
    Ok(())
}

/// Print a stable digest of the overlay files' names and mtimes.
///
/// This is sufficient information to decide whether a rebuild is necessary
/// after overlay changes. Packages and files are visited in sorted order so
/// repeated invocations over identical trees yield byte-identical output.
pub fn print_extra_files_hash(w: &mut impl Write, app: &App) -> Result<(), ModeError> {
    let mut hasher = Sha1::new();

    let mut packages: Vec<_> = app.packages.iter().filter(|p| p.base_dir.is_some()).collect();
    packages.sort_by(|a, b| a.import_path.cmp(&b.import_path));
    for pkg in packages {
        let Some(base_dir) = &pkg.base_dir else {
            continue;
        };
        let mut files: Vec<_> = pkg.files.iter().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        for f in files {
            let dst = base_dir.join(&f.name);
            let metadata = std::fs::metadata(&dst).map_err(|source| ModeError::Stat {
                path: dst.clone(),
                source,
            })?;
            let mtime = metadata.modified().map_err(|source| ModeError::Stat {
                path: dst.clone(),
                source,
            })?;
            let mtime: DateTime<Utc> = mtime.into();
            hasher.update(format!("{}: {}\n", dst.display(), mtime.to_rfc3339()));
        }
    }
    write!(w, "{:x}", hasher.finalize())?;
    Ok(())
}

/// Print every distinct import that is neither app-owned nor, heuristically,
/// part of the standard library: an import path with no dot is assumed
/// standard. Good enough for its intended use, namely finding the packages
/// that need to be fetched.
pub fn print_extra_packages(w: &mut impl Write, app: &App) -> Result<(), ModeError> {
    let app_pkgs: BTreeSet<&str> = app
        .packages
        .iter()
        .map(|p| p.import_path.as_str())
        .collect();

    let mut ext_pkgs: BTreeSet<&str> = BTreeSet::new();
    for pkg in &app.packages {
        // Look at all the imports for all packages, overlay ones included.
        for f in &pkg.files {
            for imp in &f.import_paths {
                if app_pkgs.contains(imp.as_str()) {
                    continue;
                }
                if !imp.contains('.') {
                    continue;
                }
                ext_pkgs.insert(imp);
            }
        }
    }

    for imp in ext_pkgs {
        writeln!(w, "{imp}")?;
    }
    Ok(())
}
