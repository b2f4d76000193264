//! parser::stdlib
//!
//! The standard-package oracle.
//!
//! An import path is standard when it contains no dot and the pinned
//! toolchain can locate the package in find-only mode. Results are memoized
//! for the life of the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::Config;

/// Memoized standard-package predicate for one toolchain root.
#[derive(Debug)]
pub struct StdOracle {
    src_roots: Vec<PathBuf>,
    archive_dir: PathBuf,
    cache: Mutex<HashMap<String, bool>>,
}

impl StdOracle {
    pub fn new(cfg: &Config) -> Self {
        let mut cache = HashMap::new();
        // There's no compiled archive for "unsafe", but it is a standard
        // package. Mention it explicitly so we avoid a useless probe.
        cache.insert("unsafe".to_string(), true);
        Self {
            src_roots: vec![cfg.goroot.join("src"), cfg.goroot.join("src").join("pkg")],
            archive_dir: cfg.goroot_search_path(),
            cache: Mutex::new(cache),
        }
    }

    /// Report whether `path` names a standard package.
    pub fn is_standard(&self, path: &str) -> bool {
        if let Some(&std) = self.cache.lock().unwrap().get(path) {
            return std;
        }
        // An import path containing a dot is never standard.
        let std = !path.contains('.') && self.probe(path);
        self.cache.lock().unwrap().insert(path.to_string(), std);
        std
    }

    /// Find-only probe of the toolchain layout: package sources under a
    /// source root, or a compiled archive under the platform directory.
    fn probe(&self, path: &str) -> bool {
        for root in &self.src_roots {
            let dir = root.join(path);
            if dir_has_go_files(&dir) {
                return true;
            }
        }
        let mut archive = self.archive_dir.join(path).into_os_string();
        archive.push(".a");
        PathBuf::from(archive).is_file()
    }
}

fn dir_has_go_files(dir: &std::path::Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".go") && !name.starts_with('_') && !name.starts_with('.') {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(goroot: PathBuf) -> Config {
        Config {
            api_version: "go1".into(),
            app_base: ".".into(),
            arch: "6".into(),
            binary_name: "_go_app.bin".into(),
            dynamic: false,
            extra_imports: vec![],
            gc_flags: vec![],
            gopath: vec![],
            goroot,
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
            work_dir: "/tmp".into(),
        }
    }

    #[test]
    fn unsafe_is_always_standard() {
        let oracle = StdOracle::new(&config(PathBuf::from("/nonexistent")));
        assert!(oracle.is_standard("unsafe"));
    }

    #[test]
    fn dotted_paths_are_never_standard() {
        let oracle = StdOracle::new(&config(PathBuf::from("/nonexistent")));
        assert!(!oracle.is_standard("github.com/foo/bar"));
    }

    #[test]
    fn finds_packages_under_the_source_root() {
        let tmp = tempfile::tempdir().unwrap();
        let fmt_dir = tmp.path().join("src").join("fmt");
        std::fs::create_dir_all(&fmt_dir).unwrap();
        std::fs::write(fmt_dir.join("print.go"), "package fmt\n").unwrap();

        let oracle = StdOracle::new(&config(tmp.path().to_path_buf()));
        assert!(oracle.is_standard("fmt"));
        assert!(!oracle.is_standard("nosuchpkg"));
    }

    #[test]
    fn finds_packages_under_the_legacy_source_root() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("src").join("pkg").join("strings");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("strings.go"), "package strings\n").unwrap();

        let oracle = StdOracle::new(&config(tmp.path().to_path_buf()));
        assert!(oracle.is_standard("strings"));
    }

    #[test]
    fn memoizes_negative_results() {
        let tmp = tempfile::tempdir().unwrap();
        let oracle = StdOracle::new(&config(tmp.path().to_path_buf()));
        assert!(!oracle.is_standard("later"));

        // Package appears after the first probe; the memo still answers.
        let dir = tmp.path().join("src").join("later");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("later.go"), "package later\n").unwrap();
        assert!(!oracle.is_standard("later"));
    }
}
