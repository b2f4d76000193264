//! config
//!
//! The frozen build configuration.
//!
//! # Design
//!
//! Command-line options and environment reads are resolved once, in the CLI
//! layer, into a [`Config`] that every later stage consumes by reference.
//! Nothing downstream re-reads the environment.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

/// Maximum number of tree imports in any single generated source file.
///
/// Root packages are those packages that are part of the app and have init
/// functions. To avoid importing huge numbers of these packages from main
/// directly, a tree of packages is constructed, with the main package as its
/// root and the root packages as its leaves, so that the main package
/// transitively imports all the root packages.
pub const MAX_ROOT_PACKAGE_TREE_IMPORTS_PER_FILE: usize = 20;

/// The resolved configuration for one driver run.
#[derive(Debug, Clone)]
pub struct Config {
    /// API version to build for (`go1`, `go1.N`, or `go1.Nbeta`).
    pub api_version: String,
    /// Path to the app root. Positional filenames are relative to this.
    pub app_base: PathBuf,
    /// The architecture specifier (`"5"`, `"6"`, or `"8"`).
    pub arch: String,
    /// Name of the final binary, relative to `work_dir`.
    pub binary_name: String,
    /// Create a binary with a dynamic linking header.
    pub dynamic: bool,
    /// Extra packages to blank-import into every user package.
    pub extra_imports: Vec<String>,
    /// Extra compiler flags, already unescaped.
    pub gc_flags: Vec<String>,
    /// Overlay search path entries.
    pub gopath: Vec<PathBuf>,
    /// Root of the toolchain installation.
    pub goroot: PathBuf,
    /// Extra linker flags, already unescaped.
    pub ld_flags: Vec<String>,
    /// Use the modern toolchain generation (long tool names, `.a` objects).
    pub modern_toolchain: bool,
    /// Overlay files whose overlay-relative path matches are not built.
    pub nobuild_files: Option<Regex>,
    /// Maximum number of compiles to run in parallel.
    pub parallelism: usize,
    /// Import paths that are allowed to duplicate toolchain package names.
    pub dupe_whitelist: HashSet<String>,
    /// If set, a binary to invoke tools with.
    pub trampoline: Option<PathBuf>,
    /// Flags to pass to the trampoline.
    pub trampoline_flags: Vec<String>,
    /// Permit unsafe packages.
    pub allow_unsafe: bool,
    /// Noisy tool invocation logging.
    pub verbose: bool,
    /// Build for the alternate VM runtime (implies unsafe).
    pub vm: bool,
    /// Directory for intermediate and output files.
    pub work_dir: PathBuf,
}

impl Config {
    /// The build tag set used for file selection: the runtime tag plus the
    /// per-release tags derived from `api_version`, plus the host identity
    /// tags the toolchain's own file selection would honor.
    pub fn build_tags(&self) -> Vec<String> {
        let mut tags = vec![
            if self.vm { "appenginevm" } else { "appengine" }.to_string(),
            goos().to_string(),
            host_arch().to_string(),
            "gc".to_string(),
        ];
        tags.extend(release_tags(&self.api_version));
        tags
    }

    /// Whether the unsafe-rejection flag is omitted from compile and link.
    pub fn permits_unsafe(&self) -> bool {
        self.allow_unsafe || self.vm
    }

    /// The object file extension for the selected toolchain generation.
    pub fn object_ext(&self) -> String {
        if self.modern_toolchain {
            ".a".to_string()
        } else {
            format!(".{}", self.arch)
        }
    }

    /// The compile tool name for the selected toolchain generation.
    pub fn compile_tool_name(&self) -> String {
        if self.modern_toolchain {
            "compile".to_string()
        } else {
            format!("{}g", self.arch)
        }
    }

    /// The link tool name for the selected toolchain generation.
    pub fn link_tool_name(&self) -> String {
        if self.modern_toolchain {
            "link".to_string()
        } else {
            format!("{}l", self.arch)
        }
    }

    /// Absolute path of a toolchain binary.
    pub fn tool_path(&self, name: &str) -> PathBuf {
        let ext = if cfg!(windows) { ".exe" } else { "" };
        self.goroot
            .join("pkg")
            .join("tool")
            .join(format!("{}_{}", goos(), full_arch(&self.arch)))
            .join(format!("{name}{ext}"))
    }

    /// The toolchain's standard-package search path. Passed ahead of the
    /// work directory so toolchain versions of dupe packages take precedence.
    pub fn goroot_search_path(&self) -> PathBuf {
        self.goroot
            .join("pkg")
            .join(format!("{}_{}", goos(), host_arch()))
    }
}

/// The default architecture specifier for the host.
pub fn default_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "8",
        "x86_64" => "6",
        "arm" => "5",
        _ => "6",
    }
}

/// Map an architecture specifier to its full name.
pub fn full_arch(c: &str) -> &'static str {
    match c {
        "5" => "arm",
        "6" => "amd64",
        "8" => "386",
        _ => "amd64",
    }
}

/// The host operating system, as the toolchain names it.
pub fn goos() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    }
}

/// The host architecture, as the toolchain names it.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "386",
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "arm",
        arch => arch,
    }
}

/// The release tags implied by an API version string.
///
/// A `go1.Nbeta` version yields `go1.1` through `go1.N`; anything else yields
/// the tags for the highest supported release.
pub fn release_tags(api_version: &str) -> Vec<String> {
    // We support up to go1.4.
    let v = beta_version(api_version).unwrap_or(4);
    (1..=v).map(|i| format!("go1.{i}")).collect()
}

/// Extract the minor version from an API version string of the form
/// `go1.Nbeta`.
pub fn beta_version(api_version: &str) -> Option<u32> {
    static BETA: OnceLock<Regex> = OnceLock::new();
    let re = BETA.get_or_init(|| Regex::new(r"go1\.(\d+)beta").expect("static regex"));
    let caps = re.captures(api_version)?;
    caps[1].parse().ok()
}

/// Split a backslash-comma-escaped flag list.
///
/// The list separator is `,`; a `\,` sequence produces a literal comma
/// within a single flag.
pub fn parse_tool_flags(s: &str) -> Vec<String> {
    let mut flags = Vec::new();
    let mut cur = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                chars.next();
                cur.push(',');
            }
            ',' => {
                flags.push(std::mem::take(&mut cur));
            }
            _ => cur.push(c),
        }
    }
    if !cur.is_empty() {
        flags.push(cur);
    }
    flags
}

/// Split a plain comma-separated list, dropping empty entries.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod versions {
        use super::*;

        #[test]
        fn beta_version_parses_minor() {
            assert_eq!(beta_version("go1.3beta"), Some(3));
            assert_eq!(beta_version("go1.12beta"), Some(12));
        }

        #[test]
        fn beta_version_rejects_release_forms() {
            assert_eq!(beta_version("go1"), None);
            assert_eq!(beta_version("go1.2"), None);
        }

        #[test]
        fn release_tags_cap_at_supported_release() {
            assert_eq!(
                release_tags("go1"),
                vec!["go1.1", "go1.2", "go1.3", "go1.4"]
            );
        }

        #[test]
        fn release_tags_honor_beta_minor() {
            assert_eq!(release_tags("go1.2beta"), vec!["go1.1", "go1.2"]);
        }
    }

    mod arch {
        use super::*;

        #[test]
        fn full_arch_maps_specifiers() {
            assert_eq!(full_arch("5"), "arm");
            assert_eq!(full_arch("6"), "amd64");
            assert_eq!(full_arch("8"), "386");
            assert_eq!(full_arch("7"), "amd64");
        }
    }

    mod flags {
        use super::*;

        #[test]
        fn parse_tool_flags_splits_on_comma() {
            assert_eq!(parse_tool_flags("-a,-b,-c"), vec!["-a", "-b", "-c"]);
        }

        #[test]
        fn parse_tool_flags_unescapes_commas() {
            assert_eq!(parse_tool_flags(r"-X=a\,b,-Y"), vec!["-X=a,b", "-Y"]);
        }

        #[test]
        fn parse_tool_flags_empty_input() {
            assert!(parse_tool_flags("").is_empty());
        }
    }

    mod toolchain {
        use super::*;
        use std::path::Path;

        fn config(modern: bool) -> Config {
            Config {
                api_version: "go1".into(),
                app_base: ".".into(),
                arch: "6".into(),
                binary_name: "_go_app.bin".into(),
                dynamic: false,
                extra_imports: vec![],
                gc_flags: vec![],
                gopath: vec![],
                goroot: PathBuf::from("/goroot"),
                ld_flags: vec![],
                modern_toolchain: modern,
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
        fn legacy_generation_uses_short_names() {
            let cfg = config(false);
            assert_eq!(cfg.compile_tool_name(), "6g");
            assert_eq!(cfg.link_tool_name(), "6l");
            assert_eq!(cfg.object_ext(), ".6");
        }

        #[test]
        fn modern_generation_uses_long_names() {
            let cfg = config(true);
            assert_eq!(cfg.compile_tool_name(), "compile");
            assert_eq!(cfg.link_tool_name(), "link");
            assert_eq!(cfg.object_ext(), ".a");
        }

        #[test]
        fn tool_path_lives_under_goroot() {
            let cfg = config(true);
            let p = cfg.tool_path("compile");
            assert!(p.starts_with(Path::new("/goroot").join("pkg").join("tool")));
            assert!(p.to_string_lossy().contains(&format!("{}_amd64", goos())));
        }

        #[test]
        fn vm_implies_unsafe() {
            let mut cfg = config(false);
            cfg.vm = true;
            assert!(cfg.permits_unsafe());
        }

        #[test]
        fn build_tags_follow_runtime_flavor() {
            let cfg = config(false);
            assert!(cfg.build_tags().contains(&"appengine".to_string()));

            let mut vm = config(false);
            vm.vm = true;
            let tags = vm.build_tags();
            assert!(tags.contains(&"appenginevm".to_string()));
            assert!(!tags.contains(&"appengine".to_string()));
        }
    }
}
