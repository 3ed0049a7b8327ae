//! Metrics collection from the local Traffic Server instance.
//!
//! The `CommandRunner` trait abstracts the `traffic_ctl` subprocess so the
//! rest of the plugin can be tested without Traffic Server installed; the
//! real implementation is `TrafficCtl`. Parsing of the captured output
//! lives in `parser`.

pub mod parser;

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::metrics::Snapshot;

/// The administrative command queried for statistics.
const TRAFFIC_CTL: &str = "traffic_ctl";

/// Arguments requesting every variable under the `proxy` namespace.
const TRAFFIC_CTL_ARGS: &[&str] = &["metric", "match", "^proxy"];

/// Default bound on subprocess execution. `traffic_ctl` answers in
/// milliseconds when healthy; a run that takes this long is stuck.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval between child exit-status checks while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Error type for collection failures. All variants are fatal to the run;
/// there are no retries and no partial results.
#[derive(Debug)]
pub enum CollectError {
    /// The command could not be started (missing binary, permissions).
    Spawn(std::io::Error),
    /// I/O error while waiting on the child.
    Io(std::io::Error),
    /// The command ran but exited with a failure status.
    Exit { status: ExitStatus, stderr: String },
    /// The command did not finish within the deadline and was killed.
    Timeout(Duration),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Spawn(e) => write!(f, "failed to run {}: {}", TRAFFIC_CTL, e),
            CollectError::Io(e) => write!(f, "I/O error waiting for {}: {}", TRAFFIC_CTL, e),
            CollectError::Exit { status, stderr } => {
                if stderr.is_empty() {
                    write!(f, "{} failed: {}", TRAFFIC_CTL, status)
                } else {
                    write!(f, "{} failed: {}: {}", TRAFFIC_CTL, status, stderr)
                }
            }
            CollectError::Timeout(limit) => {
                write!(f, "{} did not finish within {:?}", TRAFFIC_CTL, limit)
            }
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// Abstraction over the statistics source.
///
/// Production uses `TrafficCtl`; tests substitute canned output.
pub trait CommandRunner {
    /// Runs the command and returns its captured stdout.
    fn run(&self) -> Result<String, CollectError>;
}

/// Real runner that invokes `traffic_ctl metric match ^proxy`.
#[derive(Debug, Clone, Copy)]
pub struct TrafficCtl {
    timeout: Duration,
}

impl TrafficCtl {
    /// Creates a runner with the default execution deadline.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Creates a runner with a custom execution deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TrafficCtl {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains a child pipe to a string on a separate thread.
///
/// The pipes must be drained while the child runs: a child blocked on a
/// full stdout pipe would never exit and the deadline poll would kill it.
fn drain<P: Read + Send + 'static>(pipe: Option<P>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

impl CommandRunner for TrafficCtl {
    fn run(&self) -> Result<String, CollectError> {
        let start = Instant::now();
        let mut child = Command::new(TRAFFIC_CTL)
            .args(TRAFFIC_CTL_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(CollectError::Spawn)?;

        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let deadline = start + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(CollectError::Timeout(self.timeout));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CollectError::Io(e));
                }
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(CollectError::Exit {
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        debug!(
            "{} returned {} bytes in {:?}",
            TRAFFIC_CTL,
            stdout.len(),
            start.elapsed()
        );
        Ok(stdout)
    }
}

/// Collects one snapshot: runs the command and parses its output.
///
/// Command failure aborts the run; malformed output lines do not.
pub fn collect<R: CommandRunner>(runner: &R) -> Result<Snapshot, CollectError> {
    let text = runner.run()?;
    Ok(parser::parse_stats(&text))
}
