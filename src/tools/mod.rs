//! External tool adapters and shared subprocess plumbing.

pub mod mash;
pub mod materialise;
pub mod minimap2;
pub mod traits;

pub use mash::MashSketcher;
pub use materialise::LocalMirrorMaterialiser;
pub use minimap2::Minimap2Aligner;
pub use traits::{Aligner, MaterialisedReferences, ReferenceMaterialiser, Sketcher};

use anyhow::{bail, Context, Result};
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

use crate::utils::cancel::CancelToken;

/// How long a child gets between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run a child to completion with its output discarded. See [`wait_child`].
pub fn run_cancellable(mut cmd: Command, what: &str, cancel: &CancelToken) -> Result<()> {
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());
    tracing::debug!(command = ?cmd, "spawning {}", what);
    let child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {}", what))?;
    wait_child(child, what, cancel).map(|_| ())
}

/// Poll a spawned child until it exits, watching the cancellation token.
/// On cancellation the child receives SIGTERM, then SIGKILL after a grace
/// period, and the call reports failure. Non-zero exits surface the
/// captured stderr.
pub fn wait_child(mut child: Child, what: &str, cancel: &CancelToken) -> Result<Output> {
    loop {
        if cancel.is_cancelled() {
            terminate(&mut child, what);
            bail!("{} cancelled", what);
        }
        match child.try_wait()? {
            Some(status) => {
                let output = child
                    .wait_with_output()
                    .with_context(|| format!("collecting {} output", what))?;
                if !status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    bail!("{} failed ({}):\n{}", what, status, stderr.trim());
                }
                return Ok(output);
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }
}

/// SIGTERM first; SIGKILL when the child ignores it.
fn terminate(child: &mut Child, what: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(child.id() as i32);
    tracing::info!("terminating {} (pid {})", what, pid);
    if kill(pid, Signal::SIGTERM).is_ok() {
        let deadline = std::time::Instant::now() + TERM_GRACE;
        while std::time::Instant::now() < deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Probe `binary <arg>` and return the first output line. Some tools print
/// their version to stderr, so both streams are consulted.
pub fn probe_version(binary: &str, arg: &str) -> Result<String> {
    let output = Command::new(binary)
        .arg(arg)
        .output()
        .with_context(|| format!("failed to run {}", binary))?;
    if !output.status.success() && output.stdout.is_empty() && output.stderr.is_empty() {
        bail!("{} returned error", binary);
    }
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    Ok(text.lines().next().unwrap_or("").trim().to_string())
}
