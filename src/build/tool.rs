//! build::tool
//!
//! The single doorway to the external toolchain.
//!
//! Every compiler and linker invocation flows through [`run_tool`]: one
//! helper that applies the trampoline wrapper, replaces the environment with
//! the fixed tool environment, and streams the tool's stdout/stderr to the
//! driver's own unmodified. Per-tool wall-clock totals are kept in [`Timer`]s
//! and logged after the build.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;

/// Errors from invoking an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool could not be started at all.
    #[error("failed running {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    /// The tool ran and exited unsuccessfully.
    #[error("failed running {tool}: {status}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
    },
}

/// Run one tool to completion.
///
/// The executed argv is `args` as given, or
/// `<trampoline> <trampoline flags...> -- <args...>` when a trampoline is
/// configured. The tool inherits the driver's stdout and stderr; its
/// environment is exactly `env`.
pub async fn run_tool(
    cfg: &Config,
    args: &[String],
    env: &[(String, String)],
) -> Result<(), ToolError> {
    if cfg.verbose {
        debug!("run {args:?}");
    }
    let tool = Path::new(&args[0])
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args[0].clone());

    let argv: Vec<String> = match &cfg.trampoline {
        Some(trampoline) => {
            let mut v = vec![trampoline.to_string_lossy().to_string()];
            v.extend(cfg.trampoline_flags.iter().cloned());
            v.push("--".to_string());
            v.extend(args.iter().cloned());
            v
        }
        None => args.to_vec(),
    };

    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .env_clear()
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?;
    if !status.success() {
        return Err(ToolError::Failed { tool, status });
    }
    Ok(())
}

/// Invocation count and total wall clock for one tool.
#[derive(Debug)]
pub struct Timer {
    name: String,
    state: Mutex<TimerState>,
}

#[derive(Debug, Default)]
struct TimerState {
    n: u32,
    total: Duration,
}

impl Timer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(TimerState::default()),
        }
    }

    /// Run a tool, attributing its wall clock to this timer whether or not
    /// it succeeds.
    pub async fn run(
        &self,
        cfg: &Config,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<(), ToolError> {
        let start = Instant::now();
        let result = run_tool(cfg, args, env).await;

        let mut state = self.state.lock().unwrap();
        state.n += 1;
        state.total += start.elapsed();
        drop(state);

        result
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        // Display total only to millisecond resolution.
        let total = Duration::from_millis(state.total.as_millis() as u64);
        write!(f, "{}×{} ({:?} total)", state.n, self.name, total)
    }
}
