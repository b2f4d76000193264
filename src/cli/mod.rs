//! cli
//!
//! Command-line entry point.
//!
//! # Responsibilities
//!
//! - Parse the command line and freeze the [`Config`]
//! - Initialize logging (stderr, or the `--log_file` target)
//! - Dispatch to an alternate print mode, or drive a full build
//!
//! All failures are reported with the `go-app-builder: ` prefix and a
//! non-zero exit code. A parse failure that carries a list of errors prints
//! one summary line followed by one line per underlying error.

pub mod args;

pub use args::Cli;

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::CommandFactory;
use tracing::error;

use crate::config::{default_arch, parse_tool_flags, split_list, Config};
use crate::parser::{self, ParseError};
use crate::{build, modes};

/// Run the driver. This is the whole binary behind `main`.
pub fn run() -> ExitCode {
    let cli = Cli::parse_args();
    if cli.files.is_empty() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        return ExitCode::FAILURE;
    }

    if let Err(err) = init_logging(&cli) {
        eprintln!("go-app-builder: {err:#}");
        return ExitCode::FAILURE;
    }

    let cfg = match build_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => return fail(format!("{err:#}")),
    };

    let mut app = match parser::parse_files(&cfg, &cli.files) {
        Ok(app) => app,
        Err(ParseError::Source(list)) => {
            error!(
                "go-app-builder: Failed parsing input ({} error{})",
                list.len(),
                plural(list.len(), "s")
            );
            for err in &list.0 {
                error!("{err}");
            }
            return ExitCode::FAILURE;
        }
        Err(err) => return fail(format!("Failed parsing input: {err}")),
    };

    let mut stdout = std::io::stdout().lock();
    if cli.print_extras {
        return finish(modes::print_extra_files(&mut stdout, &app));
    }
    if cli.print_extras_hash {
        return finish(modes::print_extra_files_hash(&mut stdout, &app));
    }
    if cli.print_extra_packages {
        return finish(modes::print_extra_packages(&mut stdout, &app));
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => return fail(format!("failed starting runtime: {err}")),
    };
    finish(runtime.block_on(build::build_app(&mut app, &cfg)))
}

fn finish<E: std::fmt::Display>(result: std::result::Result<(), E>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fail(err.to_string()),
    }
}

fn fail(msg: String) -> ExitCode {
    error!("go-app-builder: {msg}");
    ExitCode::FAILURE
}

fn plural(n: usize, suffix: &str) -> &str {
    if n == 1 {
        ""
    } else {
        suffix
    }
}

/// Route messages to stderr, or append them to `--log_file`.
fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);
    match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed opening log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Freeze the command line into the configuration every stage consumes.
fn build_config(cli: &Cli) -> Result<Config> {
    let nobuild_files = if cli.nobuild_files.is_empty() {
        None
    } else {
        Some(
            regex::Regex::new(&cli.nobuild_files)
                .map_err(|err| anyhow!("bad --nobuild_files: {err}"))?,
        )
    };

    Ok(Config {
        api_version: cli.api_version.clone(),
        app_base: cli.app_base.clone(),
        arch: cli
            .arch
            .clone()
            .unwrap_or_else(|| default_arch().to_string()),
        binary_name: cli.binary_name.clone(),
        dynamic: cli.dynamic,
        extra_imports: split_list(&cli.extra_imports),
        gc_flags: parse_tool_flags(&cli.gcflags),
        gopath: std::env::split_paths(&cli.gopath)
            .filter(|p| !p.as_os_str().is_empty())
            .collect(),
        goroot: cli.goroot.clone(),
        ld_flags: parse_tool_flags(&cli.ldflags),
        modern_toolchain: cli.modern_toolchain,
        nobuild_files,
        parallelism: cli.parallelism,
        dupe_whitelist: split_list(&cli.pkg_dupe_whitelist).into_iter().collect(),
        trampoline: cli.trampoline.clone(),
        trampoline_flags: split_list(&cli.trampoline_flags),
        allow_unsafe: cli.allow_unsafe,
        verbose: cli.verbose,
        vm: cli.vm,
        work_dir: cli.work_dir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("go-app-builder").chain(args.iter().copied()))
            .expect("parse failed")
    }

    #[test]
    fn config_resolves_lists_and_defaults() {
        let cfg = build_config(&cli(&[
            "--extra_imports",
            "a,b",
            "--gcflags",
            r"-m,-X=x\,y",
            "--pkg_dupe_whitelist",
            "appengine,regexp",
            "f.go",
        ]))
        .unwrap();
        assert_eq!(cfg.extra_imports, vec!["a", "b"]);
        assert_eq!(cfg.gc_flags, vec!["-m", "-X=x,y"]);
        assert!(cfg.dupe_whitelist.contains("regexp"));
        assert!(!cfg.arch.is_empty());
    }

    #[test]
    fn bad_nobuild_regex_is_rejected() {
        let err = build_config(&cli(&["--nobuild_files", "(", "f.go"])).unwrap_err();
        assert!(err.to_string().contains("bad --nobuild_files"));
    }

    #[test]
    fn plural_suffix() {
        assert_eq!(plural(1, "s"), "");
        assert_eq!(plural(2, "s"), "s");
    }
}
