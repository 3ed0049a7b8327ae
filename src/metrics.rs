//! Static metric and graph definitions.
//!
//! Two flat tables drive the whole plugin: `METRIC_VARIABLES` maps Traffic
//! Server statistic names to short metric keys, and `GRAPHS` groups those
//! keys into the display graphs mackerel-agent renders. Both are fixed at
//! build time; nothing here computes anything.

use std::collections::HashMap;

use serde::Serialize;

/// One run's collected values, keyed by metric key (e.g. `cache_hits`).
///
/// Keys absent from the `traffic_ctl` output are simply absent here;
/// they are never defaulted to zero.
pub type Snapshot = HashMap<&'static str, u64>;

/// Numeric type hint for a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericType {
    /// Monotonic counter, diffed as unsigned 64-bit.
    Uint64,
    /// Plain gauge value.
    #[default]
    Float64,
}

/// Display metadata for a single metric within a graph.
///
/// Only `name`, `label` and `stacked` appear in the graph-definition JSON;
/// `diff` and `type_hint` steer value reporting and are not part of the
/// schema output.
#[derive(Debug, Serialize)]
pub struct MetricMeta {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(skip)]
    pub diff: bool,
    pub stacked: bool,
    #[serde(skip)]
    pub type_hint: NumericType,
}

/// Display metadata for one graph group.
#[derive(Debug, Serialize)]
pub struct GraphMeta {
    /// Graph key, also the prefix of every reported metric name.
    #[serde(skip)]
    pub key: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub metrics: &'static [MetricMeta],
}

/// Maps a metric key to the Traffic Server variable that feeds it.
#[derive(Debug, Clone, Copy)]
pub struct MetricVariable {
    pub metric: &'static str,
    pub variable: &'static str,
}

/// Graph definitions reported to mackerel-agent.
pub const GRAPHS: &[GraphMeta] = &[
    GraphMeta {
        key: "trafficserver.cache",
        label: "Trafficserver Cache Hits/Misses",
        unit: "integer",
        metrics: &[
            MetricMeta {
                name: "cache_hits",
                label: "Hits",
                diff: true,
                stacked: true,
                type_hint: NumericType::Uint64,
            },
            MetricMeta {
                name: "cache_misses",
                label: "Misses",
                diff: true,
                stacked: true,
                type_hint: NumericType::Uint64,
            },
        ],
    },
    GraphMeta {
        key: "trafficserver.http_response_codes",
        label: "Trafficserver HTTP Response Codes",
        unit: "integer",
        metrics: &[
            MetricMeta {
                name: "http_2xx",
                label: "2xx",
                diff: true,
                stacked: true,
                type_hint: NumericType::Uint64,
            },
            MetricMeta {
                name: "http_3xx",
                label: "3xx",
                diff: true,
                stacked: true,
                type_hint: NumericType::Uint64,
            },
            MetricMeta {
                name: "http_4xx",
                label: "4xx",
                diff: true,
                stacked: true,
                type_hint: NumericType::Uint64,
            },
            MetricMeta {
                name: "http_5xx",
                label: "5xx",
                diff: true,
                stacked: true,
                type_hint: NumericType::Uint64,
            },
        ],
    },
    GraphMeta {
        key: "trafficserver.connections",
        label: "Trafficserver Current Connections",
        unit: "integer",
        metrics: &[
            MetricMeta {
                name: "conn_server",
                label: "Server",
                diff: false,
                stacked: false,
                type_hint: NumericType::Float64,
            },
            MetricMeta {
                name: "conn_client_h1",
                label: "http1 Client",
                diff: false,
                stacked: false,
                type_hint: NumericType::Float64,
            },
            MetricMeta {
                name: "conn_client_h2",
                label: "http2 Client",
                diff: false,
                stacked: false,
                type_hint: NumericType::Float64,
            },
        ],
    },
];

/// Metric key to Traffic Server variable name, one entry per graph metric.
pub const METRIC_VARIABLES: &[MetricVariable] = &[
    MetricVariable {
        metric: "cache_hits",
        variable: "proxy.process.cache_total_hits",
    },
    MetricVariable {
        metric: "cache_misses",
        variable: "proxy.process.cache_total_misses",
    },
    MetricVariable {
        metric: "http_2xx",
        variable: "proxy.process.http.2xx_responses",
    },
    MetricVariable {
        metric: "http_3xx",
        variable: "proxy.process.http.3xx_responses",
    },
    MetricVariable {
        metric: "http_4xx",
        variable: "proxy.process.http.4xx_responses",
    },
    MetricVariable {
        metric: "http_5xx",
        variable: "proxy.process.http.5xx_responses",
    },
    MetricVariable {
        metric: "conn_server",
        variable: "proxy.process.current_server_connections",
    },
    MetricVariable {
        metric: "conn_client_h1",
        variable: "proxy.process.http.current_client_connections",
    },
    MetricVariable {
        metric: "conn_client_h2",
        variable: "proxy.process.http2.current_client_connections",
    },
];

/// Builds the reverse lookup used by the parser: variable name → metric key.
pub fn variable_lookup() -> HashMap<&'static str, &'static str> {
    METRIC_VARIABLES
        .iter()
        .map(|mv| (mv.variable, mv.metric))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_graph_metric_has_a_variable() {
        let metrics: HashSet<&str> = METRIC_VARIABLES.iter().map(|mv| mv.metric).collect();
        for graph in GRAPHS {
            for metric in graph.metrics {
                assert!(
                    metrics.contains(metric.name),
                    "graph metric '{}' has no variable mapping",
                    metric.name
                );
            }
        }
    }

    #[test]
    fn test_every_variable_belongs_to_a_graph() {
        let graph_metrics: HashSet<&str> = GRAPHS
            .iter()
            .flat_map(|g| g.metrics.iter().map(|m| m.name))
            .collect();
        for mv in METRIC_VARIABLES {
            assert!(
                graph_metrics.contains(mv.metric),
                "variable '{}' maps to metric '{}' which no graph uses",
                mv.variable,
                mv.metric
            );
        }
    }

    #[test]
    fn test_lookup_has_no_duplicate_variables() {
        assert_eq!(variable_lookup().len(), METRIC_VARIABLES.len());
    }

    #[test]
    fn test_diff_metrics_are_uint64() {
        for graph in GRAPHS {
            for metric in graph.metrics {
                if metric.diff {
                    assert_eq!(metric.type_hint, NumericType::Uint64, "{}", metric.name);
                }
            }
        }
    }
}
