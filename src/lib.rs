//! mackerel-plugin-trafficserver - Apache Traffic Server metrics plugin.
//!
//! Collects runtime statistics from a local Traffic Server instance via
//! `traffic_ctl` and reports them to mackerel-agent:
//! - `collector` — subprocess invocation and stats parsing
//! - `metrics` — static metric/graph definitions
//! - `plugin` — mackerel plugin protocol (schema output, diff state, values)

pub mod collector;
pub mod metrics;
pub mod plugin;
