//! build
//!
//! The compile/link orchestrator.
//!
//! # Architecture
//!
//! One worker task per package. Each worker first awaits the completion
//! signal of every dependency, then acquires a slot from a counting
//! semaphore sized by the parallelism option, then runs the compile step,
//! then marks its own completion. The first failure is published to a
//! buffered error channel and closes the abort signal; workers still waiting
//! exit without running. The link step runs strictly after every compile
//! worker has finished.
//!
//! # Invariants
//!
//! - No compile for a package starts before all of its dependencies'
//!   completion signals have fired.
//! - Exactly one error survives a failed run: the first one observed.
//! - Every file registered for deferred removal is deleted before the build
//!   routine returns, on success and on failure alike.

pub mod tool;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::info;

use crate::config::{Config, MAX_ROOT_PACKAGE_TREE_IMPORTS_PER_FILE};
use crate::core::app::{App, File, Package};
use crate::synth::{construct_root_package_tree, make_extra_imports, make_main, SynthError};

use tool::{Timer, ToolError};

/// Errors from the build phase.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed creating import tree: {0}")]
    ImportTree(SynthError),

    #[error("failed writing main: {source}")]
    WriteMain { source: std::io::Error },

    #[error("failed creating directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed copying {src} to {dst}: {source}")]
    Copy {
        src: PathBuf,
        dst: PathBuf,
        source: std::io::Error,
    },

    #[error("failed writing extra-imports file {path}: {source}")]
    WriteExtraImports {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("failed reading output binary {path}: {source}")]
    StatBinary {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("created binary has zero size")]
    ZeroSizeBinary,
}

/// Files to delete before the build routine returns. Workers append
/// concurrently.
#[derive(Debug, Default)]
struct Cleanup {
    files: Mutex<Vec<PathBuf>>,
}

impl Cleanup {
    fn remove_later(&self, path: PathBuf) {
        self.files.lock().unwrap().push(path);
    }

    fn remove_all(&self) {
        let files: Vec<PathBuf> = self.files.lock().unwrap().drain(..).collect();
        for path in files {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.remove_all();
    }
}

/// Build the app: bound the root fan-in, synthesize main, compile every
/// package honoring dependency order, and link the final binary.
pub async fn build_app(app: &mut App, cfg: &Config) -> Result<(), BuildError> {
    let cleanup = Arc::new(Cleanup::default());
    let g_timer = Arc::new(Timer::new(cfg.compile_tool_name()));
    let l_timer = Arc::new(Timer::new(cfg.link_tool_name()));

    let result = build_inner(app, cfg, &cleanup, &g_timer, &l_timer).await;
    info!("go-app-builder: build timing: {g_timer}, {l_timer}");
    cleanup.remove_all();
    result
}

async fn build_inner(
    app: &mut App,
    cfg: &Config,
    cleanup: &Arc<Cleanup>,
    g_timer: &Arc<Timer>,
    l_timer: &Arc<Timer>,
) -> Result<(), BuildError> {
    let (new_packages, new_roots) = construct_root_package_tree(
        &app.root_packages,
        MAX_ROOT_PACKAGE_TREE_IMPORTS_PER_FILE,
        cfg,
    )
    .map_err(BuildError::ImportTree)?;
    for pkg in &new_packages {
        for f in &pkg.files {
            cleanup.remove_later(PathBuf::from(&f.name));
        }
    }
    for pkg in new_packages {
        app.push_package(pkg);
    }
    app.root_packages = new_roots;

    let main_file = cfg.work_dir.join("_go_main.go");
    cleanup.remove_later(main_file.clone());
    std::fs::write(&main_file, make_main(app))
        .map_err(|source| BuildError::WriteMain { source })?;
    app.push_package(Package {
        import_path: "main".to_string(),
        files: vec![File {
            name: main_file.to_string_lossy().to_string(),
            package_name: "main".to_string(),
            ..File::default()
        }],
        dependencies: app.root_packages.clone(),
        synthetic: true,
        ..Package::default()
    });

    // Common environment for compiler and linker. MALLOC_CHECK_ selects a
    // less efficient but stricter malloc/free.
    let env: Vec<(String, String)> = vec![
        ("GOROOT".to_string(), cfg.goroot.to_string_lossy().to_string()),
        ("MALLOC_CHECK_".to_string(), "3".to_string()),
    ];

    let compiler = Arc::new(Compiler {
        cfg: Arc::new(cfg.clone()),
        compile_tool: cfg.tool_path(&cfg.compile_tool_name()),
        goroot_search_path: cfg.goroot_search_path(),
        env: env.clone(),
        extra: cfg.extra_imports.clone(),
        timer: g_timer.clone(),
        cleanup: cleanup.clone(),
    });

    // Dependency edges as indices into the package list.
    let packages: Arc<Vec<Package>> = Arc::new(app.packages.clone());
    let dep_indices: Vec<Vec<usize>> = packages
        .iter()
        .map(|p| {
            p.dependencies
                .iter()
                .filter_map(|d| app.package_index.get(d).copied())
                .collect()
        })
        .collect();

    // Per-package completion signals, a first-error channel, an abort
    // signal, and the compile semaphore.
    let mut done_tx: Vec<watch::Sender<bool>> = Vec::new();
    let mut done_rx: Vec<watch::Receiver<bool>> = Vec::new();
    for _ in 0..packages.len() {
        let (tx, rx) = watch::channel(false);
        done_tx.push(tx);
        done_rx.push(rx);
    }
    let (err_tx, mut err_rx) = mpsc::channel::<BuildError>(1);
    let (abort_tx, abort_rx) = watch::channel(false);
    let abort_tx = Arc::new(abort_tx);
    let sem = Arc::new(Semaphore::new(cfg.parallelism.max(1)));

    // Each package gets its own worker that blocks on the completion of its
    // dependencies' compilations.
    let mut workers = JoinSet::new();
    for (i, done) in done_tx.into_iter().enumerate() {
        let dep_rxs: Vec<watch::Receiver<bool>> =
            dep_indices[i].iter().map(|&d| done_rx[d].clone()).collect();
        let mut abort = abort_rx.clone();
        let abort_tx = abort_tx.clone();
        let err_tx = err_tx.clone();
        let sem = sem.clone();
        let compiler = compiler.clone();
        let packages = packages.clone();

        workers.spawn(async move {
            for mut rx in dep_rxs {
                tokio::select! {
                    changed = rx.wait_for(|done| *done) => {
                        // A dropped sender means that worker aborted.
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = abort.wait_for(|a| *a) => return,
                }
            }
            let _permit = tokio::select! {
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => return,
                },
                _ = abort.wait_for(|a| *a) => return,
            };

            match compiler.compile(i, &packages[i]).await {
                Ok(()) => {
                    // Unblocks dependent packages.
                    let _ = done.send(true);
                }
                Err(err) => {
                    // We only care about the first compile to fail. If this
                    // error is the first, tell the others to abort.
                    if err_tx.try_send(err).is_ok() {
                        let _ = abort_tx.send(true);
                    }
                }
            }
        });
    }
    drop(err_tx);

    // Wait for either a compile error, or for every package to be compiled.
    while workers.join_next().await.is_some() {}
    if let Ok(err) = err_rx.try_recv() {
        return Err(err);
    }

    // Link phase.
    let last = &app.packages[app.packages.len() - 1];
    let archive_file = path_with_ext(cfg.work_dir.join(&last.import_path), &cfg.object_ext());
    let binary_file = cfg.work_dir.join(&cfg.binary_name);
    let mut args: Vec<String> = vec![
        cfg.tool_path(&cfg.link_tool_name()).to_string_lossy().to_string(),
        "-L".to_string(),
        cfg.goroot_search_path().to_string_lossy().to_string(),
        "-L".to_string(),
        cfg.work_dir.to_string_lossy().to_string(),
        "-o".to_string(),
        binary_file.to_string_lossy().to_string(),
    ];
    if !cfg.dynamic {
        // Statically linked, no dwarf, stripped.
        args.extend(["-d", "-w", "-s"].map(String::from));
    }
    if !cfg.permits_unsafe() {
        args.push("-u".to_string());
    }
    args.extend(cfg.ld_flags.iter().cloned());
    args.push(archive_file.to_string_lossy().to_string());
    l_timer.run(cfg, &args, &env).await?;

    // A zero-length output indicates an unexpected linker failure.
    let metadata = std::fs::metadata(&binary_file).map_err(|source| BuildError::StatBinary {
        path: binary_file.clone(),
        source,
    })?;
    if metadata.len() == 0 {
        return Err(BuildError::ZeroSizeBinary);
    }

    Ok(())
}

/// One compile invocation's shared context.
#[derive(Debug)]
struct Compiler {
    cfg: Arc<Config>,
    compile_tool: PathBuf,
    goroot_search_path: PathBuf,
    env: Vec<(String, String)>,
    extra: Vec<String>,
    timer: Arc<Timer>,
    cleanup: Arc<Cleanup>,
}

impl Compiler {
    /// Compile one package into its object under the work directory.
    async fn compile(&self, i: usize, pkg: &Package) -> Result<(), BuildError> {
        let cfg = &self.cfg;
        let object_file = path_with_ext(cfg.work_dir.join(&pkg.import_path), &cfg.object_ext());
        if let Some(parent) = object_file.parent() {
            std::fs::create_dir_all(parent).map_err(|source| BuildError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut args: Vec<String> = vec![
            self.compile_tool.to_string_lossy().to_string(),
            "-I".to_string(),
            self.goroot_search_path.to_string_lossy().to_string(),
            "-I".to_string(),
            cfg.work_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            object_file.to_string_lossy().to_string(),
        ];
        if cfg.modern_toolchain {
            args.push("-pack".to_string());
        }
        if !cfg.permits_unsafe() {
            args.push("-u".to_string());
        }
        args.extend(cfg.gc_flags.iter().cloned());

        let mut strip_dir = cfg.app_base.clone();
        let mut files: Vec<String> = Vec::new();
        if !pkg.synthetic {
            let base = match &pkg.base_dir {
                Some(base) => base.clone(),
                None => {
                    // The compiler only accepts one -trimpath flag, so copy
                    // the app sources into the work directory and strip that.
                    let pkg_dir = cfg.work_dir.join(&pkg.import_path);
                    std::fs::create_dir_all(&pkg_dir).map_err(|source| {
                        BuildError::CreateDir {
                            path: pkg_dir.clone(),
                            source,
                        }
                    })?;
                    for f in &pkg.files {
                        let src = cfg.app_base.join(&f.name);
                        let dst = cfg.work_dir.join(&f.name);
                        if src == dst {
                            // app_base and work_dir can be the same.
                            continue;
                        }
                        self.cleanup.remove_later(dst.clone());
                        std::fs::copy(&src, &dst).map_err(|source| BuildError::Copy {
                            src,
                            dst: dst.clone(),
                            source,
                        })?;
                    }
                    strip_dir = cfg.work_dir.clone();
                    cfg.work_dir.clone()
                }
            };
            for f in &pkg.files {
                files.push(base.join(&f.name).to_string_lossy().to_string());
            }
            // No synthetic extra imports for dupe packages: they aren't
            // linked into the binary, and this avoids a circular import.
            if !pkg.files.is_empty() && !self.extra.is_empty() && !pkg.dupe {
                let content = make_extra_imports(&pkg.files[0].package_name, &self.extra);
                let extra_file = cfg.work_dir.join(format!("_extra_imports_{i}.go"));
                self.cleanup.remove_later(extra_file.clone());
                std::fs::write(&extra_file, content).map_err(|source| {
                    BuildError::WriteExtraImports {
                        path: extra_file.clone(),
                        source,
                    }
                })?;
                files.push(extra_file.to_string_lossy().to_string());
            }
        } else {
            for f in &pkg.files {
                files.push(f.name.clone());
            }
            strip_dir = cfg.work_dir.clone();
        }

        args.push("-trimpath".to_string());
        args.push(absolutize(&strip_dir).to_string_lossy().to_string());
        args.extend(files);

        self.cleanup.remove_later(object_file);
        self.timer.run(cfg, &args, &self.env).await?;
        Ok(())
    }
}

/// Append an extension (with leading dot) to a path without replacing any
/// existing suffix of the final component.
fn path_with_ext(path: PathBuf, ext: &str) -> PathBuf {
    let mut s = path.into_os_string();
    s.push(ext);
    PathBuf::from(s)
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
