//! parser::scan
//!
//! Source discovery: groups the positional source paths by directory and
//! selects the files that participate in the build.
//!
//! # Selection
//!
//! - files named `*_test.go` are excluded;
//! - files whose basename starts with `_` or `.` are excluded;
//! - files excluded by `// +build` constraint lines are excluded.
//!
//! A directory whose files are all excluded simply contributes no package.

use std::collections::BTreeMap;
use std::path::{Path, MAIN_SEPARATOR};

use crate::config::Config;

use super::ParseError;

/// One directory's worth of selected sources.
#[derive(Debug)]
pub struct ScannedDir {
    /// Directory relative to the app base; `.` for top-level files.
    pub dir: String,
    /// Selected files: relative path and source text.
    pub files: Vec<(String, String)>,
}

/// Group the named files by directory and read the ones that survive
/// selection. Elements of `filenames` are relative to the app base.
pub fn scan_sources(cfg: &Config, filenames: &[String]) -> Result<Vec<ScannedDir>, ParseError> {
    let mut dirs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in filenames {
        let dir = dir_of(name).ok_or_else(|| ParseError::BadFilename(name.clone()))?;
        dirs.entry(dir).or_default().push(name.clone());
    }

    let tags = cfg.build_tags();
    let mut scanned = Vec::new();
    for (dir, names) in dirs {
        let mut files = Vec::new();
        for name in names {
            if !selectable(&name) {
                continue;
            }
            let full = cfg.app_base.join(&name);
            let src = std::fs::read_to_string(&full).map_err(|source| ParseError::Io {
                path: full.clone(),
                source,
            })?;
            if !should_build(&src, &tags) {
                continue;
            }
            files.push((name, src));
        }
        if files.is_empty() {
            // There were source files, but they were all excluded.
            continue;
        }
        scanned.push(ScannedDir { dir, files });
    }
    Ok(scanned)
}

/// The directory component of a source path; `.` for top-level files.
/// Returns `None` for paths with no usable enclosing directory.
fn dir_of(name: &str) -> Option<String> {
    if name.is_empty() || Path::new(name).is_absolute() {
        return None;
    }
    match Path::new(name).parent() {
        Some(p) if p.as_os_str().is_empty() => Some(".".to_string()),
        Some(p) => {
            let dir = p.to_string_lossy().to_string();
            if dir == MAIN_SEPARATOR.to_string() {
                None
            } else {
                Some(dir)
            }
        }
        None => None,
    }
}

/// Whether a file participates in the build at all, before constraint
/// evaluation.
fn selectable(name: &str) -> bool {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if !base.ends_with(".go") || base.ends_with("_test.go") {
        return false;
    }
    !(base.starts_with('_') || base.starts_with('.'))
}

/// Evaluate the `// +build` constraint lines in a file's preamble against
/// the given tag set.
///
/// A constraint line must appear before the package clause, amid only blank
/// lines and other line comments, and must be followed by a blank line.
/// Multiple constraint lines are ANDed; within a line, space-separated
/// groups are ORed and comma-separated terms within a group are ANDed; a
/// `!` prefix negates a term.
pub fn should_build(src: &str, tags: &[String]) -> bool {
    let mut header: Vec<&str> = Vec::new();
    for line in src.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            header.push(trimmed);
        } else {
            break;
        }
    }

    for (i, line) in header.iter().enumerate() {
        let rest = match line.strip_prefix("// +build") {
            Some(rest) if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') => {
                rest
            }
            _ => continue,
        };
        // Only effective when followed by a blank line before the package
        // clause.
        if !header[i + 1..].iter().any(|l| l.is_empty()) {
            continue;
        }
        let mut any_group = false;
        for group in rest.split_whitespace() {
            if group.split(',').all(|term| match_term(term, tags)) {
                any_group = true;
                break;
            }
        }
        if !any_group {
            return false;
        }
    }
    true
}

fn match_term(term: &str, tags: &[String]) -> bool {
    if let Some(negated) = term.strip_prefix('!') {
        if negated.starts_with('!') {
            // Double negation is always false.
            return false;
        }
        !tags.iter().any(|t| t == negated)
    } else {
        tags.iter().any(|t| t == term)
    }
}
