//! cli::args
//!
//! Command-line definitions using clap derive.
//!
//! Positional arguments are source file paths relative to `--app_base`.
//! `--goroot` and `--gopath` default to the like-named environment
//! variables; no other environment is read.

use std::path::PathBuf;

use clap::Parser;

/// go-app-builder builds Go App Engine apps.
///
/// It takes a list of source file names, loads and parses them, deduces
/// their package structure, creates a synthetic main package, and finally
/// compiles and links all these pieces. Files named `*_test.go` are ignored.
#[derive(Parser, Debug)]
#[command(name = "go-app-builder")]
#[command(about = "Builds Go App Engine apps", long_about = None)]
pub struct Cli {
    /// API version to build for.
    #[arg(long = "api_version", default_value = "go1")]
    pub api_version: String,

    /// Path to app root. Command-line filenames are relative to this.
    #[arg(long = "app_base", default_value = ".")]
    pub app_base: PathBuf,

    /// The Go architecture specifier (e.g. "5", "6", "8").
    #[arg(long)]
    pub arch: Option<String>,

    /// Name of final binary, relative to --work_dir.
    #[arg(long = "binary_name", default_value = "_go_app.bin")]
    pub binary_name: String,

    /// Create a binary with a dynamic linking header.
    #[arg(long)]
    pub dynamic: bool,

    /// A comma-separated list of extra packages to import.
    #[arg(long = "extra_imports", default_value = "")]
    pub extra_imports: String,

    /// Comma-separated list of extra compiler flags.
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub gcflags: String,

    /// Location of extra packages.
    #[arg(long, env = "GOPATH", default_value = "")]
    pub gopath: String,

    /// Root of the Go installation.
    #[arg(
        long,
        env = "GOROOT",
        default_value = "",
        value_parser = clap::builder::ValueParser::new(|s: &str| -> Result<PathBuf, std::convert::Infallible> { Ok(PathBuf::from(s)) })
    )]
    pub goroot: PathBuf,

    /// Comma-separated list of extra linker flags.
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub ldflags: String,

    /// If set, a file to write messages to.
    #[arg(long = "log_file")]
    pub log_file: Option<PathBuf>,

    /// Use the modern toolchain generation: long tool names and .a objects.
    #[arg(long = "modern_toolchain")]
    pub modern_toolchain: bool,

    /// Regular expression matching files to not build.
    #[arg(long = "nobuild_files", default_value = "")]
    pub nobuild_files: String,

    /// Maximum number of compiles to run in parallel.
    #[arg(long, default_value_t = 1)]
    pub parallelism: usize,

    /// Comma-separated list of packages that are okay to duplicate.
    #[arg(long = "pkg_dupe_whitelist", default_value = "")]
    pub pkg_dupe_whitelist: String,

    /// Whether to skip building and just print extra-app files.
    #[arg(long = "print_extras")]
    pub print_extras: bool,

    /// Whether to skip building and just print a hash of the extra-app files.
    #[arg(long = "print_extras_hash")]
    pub print_extras_hash: bool,

    /// Whether to skip building and just print extra-app packages.
    #[arg(long = "print_extra_packages")]
    pub print_extra_packages: bool,

    /// If set, a binary to invoke tools with.
    #[arg(long)]
    pub trampoline: Option<PathBuf>,

    /// Comma-separated flags to pass to trampoline.
    #[arg(long = "trampoline_flags", default_value = "", allow_hyphen_values = true)]
    pub trampoline_flags: String,

    /// Permit unsafe packages.
    #[arg(long = "unsafe")]
    pub allow_unsafe: bool,

    /// Noisy output.
    #[arg(long = "v")]
    pub verbose: bool,

    /// Whether to build for Managed VMs (implies --unsafe).
    #[arg(long)]
    pub vm: bool,

    /// Directory to use for intermediate and output files.
    #[arg(long = "work_dir", default_value = "/tmp")]
    pub work_dir: PathBuf,

    /// Source files, relative to --app_base.
    pub files: Vec<String>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}
