//! parser::lint
//!
//! Unkeyed composite-literal check.
//!
//! Struct literals of toolchain-package types must use keyed fields, so that
//! apps keep compiling when a library type grows a field. The check is scoped
//! to imports that resolve to toolchain packages; literals of the app's own
//! types are never examined.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::source::{ParsedSource, SourceError};

/// Types whose unkeyed literal form is idiomatic and allowed.
fn unkeyed_whitelist() -> &'static HashSet<&'static str> {
    static WHITELIST: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WHITELIST.get_or_init(|| {
        [
            "image/color.Alpha",
            "image/color.Alpha16",
            "image/color.CMYK",
            "image/color.Gray",
            "image/color.Gray16",
            "image/color.NRGBA",
            "image/color.NRGBA64",
            "image/color.NYCbCrA",
            "image/color.RGBA",
            "image/color.RGBA64",
            "image/color.YCbCr",
            "image.Point",
            "image.Rectangle",
            "image.Uniform",
            "unicode.Range16",
            "unicode.Range32",
            // App Engine-specific entries.
            "appengine/datastore.PropertyList",
            "appengine.MultiError",
        ]
        .into_iter()
        .collect()
    })
}

/// Check the composite literals collected from one file.
///
/// `is_standard` classifies an import path as a toolchain package; only
/// literals whose qualifier is bound to such an import are examined.
pub fn check_composite_lits(
    file: &str,
    parsed: &ParsedSource,
    is_standard: &dyn Fn(&str) -> bool,
) -> Vec<SourceError> {
    // Local name => import path, for toolchain imports only.
    let mut imports: HashMap<&str, &str> = HashMap::new();
    for imp in &parsed.imports {
        if !is_standard(&imp.path) {
            continue;
        }
        match imp.alias.as_deref() {
            Some(".") | Some("_") => continue,
            Some(alias) => {
                imports.insert(alias, &imp.path);
            }
            None => {
                // Toolchain packages have their last path component as
                // their package name.
                let base = imp.path.rsplit('/').next().unwrap_or(&imp.path);
                imports.insert(base, &imp.path);
            }
        }
    }

    let mut errors = Vec::new();
    for lit in &parsed.composite_lits {
        let Some(path) = imports.get(lit.qualifier.as_str()) else {
            // This must be pkg.T for a package in the app.
            continue;
        };
        let full = format!("{}.{}", path, lit.type_name);
        if unkeyed_whitelist().contains(full.as_str()) {
            continue;
        }
        if !lit.all_keyed {
            errors.push(SourceError {
                file: file.to_string(),
                line: lit.line,
                msg: format!(
                    "composite struct literal {}.{} with unkeyed fields",
                    path, lit.type_name
                ),
            });
        }
    }
    errors
}
