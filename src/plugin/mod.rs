//! Mackerel plugin protocol.
//!
//! A plugin invocation has two modes, selected by the agent through the
//! environment: schema mode (`MACKEREL_AGENT_PLUGIN_META` set) prints the
//! graph definitions as JSON; value mode collects a snapshot, turns
//! diff-flagged counters into per-minute rates using the previous run's
//! values from a small JSON state file, and prints one
//! `name<TAB>value<TAB>epoch` line per metric.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collector::{self, CollectError, CommandRunner};
use crate::metrics::{GRAPHS, GraphMeta};

/// Set by mackerel-agent when it wants the graph schema instead of values.
pub const META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";

/// Directory for plugin state files, set by mackerel-agent.
pub const WORKDIR_ENV: &str = "MACKEREL_PLUGIN_WORKDIR";

/// State file name used under the work or temp directory.
const STATE_FILE_NAME: &str = "mackerel-plugin-trafficserver";

/// Sentinel line preceding the schema JSON.
const META_HEADER: &str = "# mackerel-agent-plugin";

/// Error type for a plugin run.
#[derive(Debug)]
pub enum PluginError {
    /// Metric collection failed (fatal, no partial results).
    Collect(CollectError),
    /// The state file could not be written.
    State(std::io::Error),
    /// Writing to the output stream failed.
    Output(std::io::Error),
    /// JSON encoding failed.
    Encode(serde_json::Error),
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginError::Collect(e) => write!(f, "collection failed: {}", e),
            PluginError::State(e) => write!(f, "cannot write state file: {}", e),
            PluginError::Output(e) => write!(f, "cannot write output: {}", e),
            PluginError::Encode(e) => write!(f, "JSON encoding failed: {}", e),
        }
    }
}

impl std::error::Error for PluginError {}

impl From<CollectError> for PluginError {
    fn from(e: CollectError) -> Self {
        PluginError::Collect(e)
    }
}

/// Previous run's values, persisted between invocations for diffing.
#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    timestamp: i64,
    values: HashMap<String, u64>,
}

/// Per-minute rate of a counter, or `None` when the diff cannot be taken:
/// zero or negative elapsed time, or a counter that went backwards
/// (Traffic Server restarted).
fn per_minute(current: u64, last: u64, elapsed_secs: i64) -> Option<u64> {
    if elapsed_secs <= 0 || current < last {
        return None;
    }
    Some((current - last) * 60 / elapsed_secs as u64)
}

/// Resolves where the diff state lives: explicit override, agent work
/// directory, or the system temp directory.
fn resolve_state_path(tempfile: Option<&str>) -> PathBuf {
    if let Some(path) = tempfile {
        return PathBuf::from(path);
    }
    if let Some(workdir) = env::var_os(WORKDIR_ENV) {
        return PathBuf::from(workdir).join(STATE_FILE_NAME);
    }
    env::temp_dir().join(STATE_FILE_NAME)
}

/// The Traffic Server plugin: one collector, one state file path.
pub struct Plugin<R: CommandRunner> {
    runner: R,
    state_path: PathBuf,
}

impl<R: CommandRunner> Plugin<R> {
    /// Creates a plugin. `tempfile` overrides the state file location.
    pub fn new(runner: R, tempfile: Option<&str>) -> Self {
        Self {
            runner,
            state_path: resolve_state_path(tempfile),
        }
    }

    /// Runs the mode mackerel-agent asked for.
    pub fn run(&self, out: &mut impl Write) -> Result<(), PluginError> {
        if env::var_os(META_ENV).is_some() {
            self.print_graph_definition(out)
        } else {
            self.print_values(out)
        }
    }

    /// Prints the schema sentinel followed by the graph-definition JSON.
    pub fn print_graph_definition(&self, out: &mut impl Write) -> Result<(), PluginError> {
        let graphs: BTreeMap<&str, &GraphMeta> = GRAPHS.iter().map(|g| (g.key, g)).collect();
        let doc = serde_json::json!({ "graphs": graphs });

        writeln!(out, "{}", META_HEADER).map_err(PluginError::Output)?;
        serde_json::to_writer(&mut *out, &doc).map_err(PluginError::Encode)?;
        writeln!(out).map_err(PluginError::Output)?;
        Ok(())
    }

    /// Collects a snapshot and prints metric value lines.
    ///
    /// Diff-flagged metrics need a previous run; on the first run (or after
    /// a counter reset) they are skipped and only the state is written.
    pub fn print_values(&self, out: &mut impl Write) -> Result<(), PluginError> {
        let snapshot = collector::collect(&self.runner)?;
        let now = Utc::now().timestamp();
        let previous = self.load_state();

        for graph in GRAPHS {
            for metric in graph.metrics {
                let Some(&value) = snapshot.get(metric.name) else {
                    continue;
                };
                let reported = if metric.diff {
                    let Some(prev) = previous.as_ref() else {
                        debug!("no previous values, skipping {}", metric.name);
                        continue;
                    };
                    let Some(&last) = prev.values.get(metric.name) else {
                        continue;
                    };
                    match per_minute(value, last, now - prev.timestamp) {
                        Some(rate) => rate,
                        None => {
                            warn!("counter {} went backwards, skipping", metric.name);
                            continue;
                        }
                    }
                } else {
                    value
                };
                writeln!(out, "{}.{}\t{}\t{}", graph.key, metric.name, reported, now)
                    .map_err(PluginError::Output)?;
            }
        }

        self.save_state(&State {
            timestamp: now,
            values: snapshot
                .iter()
                .map(|(&k, &v)| (k.to_string(), v))
                .collect(),
        })
    }

    /// Loads the previous run's state. Missing or corrupt state is a first
    /// run, never an error.
    fn load_state(&self) -> Option<State> {
        let content = match fs::read_to_string(&self.state_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no state file at {}, first run", self.state_path.display());
                return None;
            }
            Err(e) => {
                warn!("cannot read state file {}: {}", self.state_path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(
                    "corrupt state file {}, treating as first run: {}",
                    self.state_path.display(),
                    e
                );
                None
            }
        }
    }

    fn save_state(&self, state: &State) -> Result<(), PluginError> {
        let encoded = serde_json::to_vec(state).map_err(PluginError::Encode)?;
        fs::write(&self.state_path, encoded).map_err(PluginError::State)
    }
}
