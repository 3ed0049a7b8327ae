//! Parser for `traffic_ctl metric match` output.
//!
//! The input is a newline-separated list of `variable value` pairs. This is
//! a pure function over the text so it is easily testable with string
//! inputs. Parsing is best-effort by design: one malformed line must never
//! cost the run the rest of its metrics.

use crate::metrics::{Snapshot, variable_lookup};

/// Parses raw `traffic_ctl` output into a snapshot.
///
/// Per line: the first whitespace-separated token is the variable name,
/// the second its value. Lines with fewer than two tokens, unknown
/// variable names, or values that do not parse as u64 are skipped
/// silently; an unparseable value leaves its metric key absent rather
/// than zero. When a variable appears twice, the last occurrence wins.
pub fn parse_stats(text: &str) -> Snapshot {
    let lookup = variable_lookup();
    let mut stat = Snapshot::new();

    for line in text.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(variable), Some(raw)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let Some(&metric) = lookup.get(variable) else {
            continue;
        };
        if let Ok(value) = raw.parse::<u64>() {
            stat.insert(metric, value);
        }
    }

    stat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_variables_are_mapped() {
        let text = "proxy.process.cache_total_hits 100\n\
                    proxy.process.cache_total_misses 5\n\
                    proxy.process.http.2xx_responses 900\n\
                    garbage line without value\n";
        let stat = parse_stats(text);

        assert_eq!(stat.len(), 3);
        assert_eq!(stat.get("cache_hits"), Some(&100));
        assert_eq!(stat.get("cache_misses"), Some(&5));
        assert_eq!(stat.get("http_2xx"), Some(&900));
        assert_eq!(stat.get("http_3xx"), None);
        assert_eq!(stat.get("conn_server"), None);
    }

    #[test]
    fn test_unknown_variables_are_ignored() {
        let stat = parse_stats("proxy.process.unknown_statistic 42\n");
        assert!(stat.is_empty());
    }

    #[test]
    fn test_short_lines_are_skipped() {
        let stat = parse_stats("proxy.process.cache_total_hits\n\nonly-one-token\n");
        assert!(stat.is_empty());
    }

    #[test]
    fn test_unparseable_value_leaves_metric_absent() {
        // Neither recorded as zero nor failing the run.
        let text = "proxy.process.cache_total_hits not-a-number\n\
                    proxy.process.cache_total_misses 5\n";
        let stat = parse_stats(text);
        assert_eq!(stat.get("cache_hits"), None);
        assert_eq!(stat.get("cache_misses"), Some(&5));
    }

    #[test]
    fn test_negative_value_is_not_a_u64() {
        let stat = parse_stats("proxy.process.cache_total_hits -1\n");
        assert_eq!(stat.get("cache_hits"), None);
    }

    #[test]
    fn test_last_duplicate_wins() {
        let text = "proxy.process.cache_total_hits 100\n\
                    proxy.process.cache_total_hits 200\n";
        let stat = parse_stats(text);
        assert_eq!(stat.get("cache_hits"), Some(&200));
    }

    #[test]
    fn test_empty_input_yields_empty_snapshot() {
        assert!(parse_stats("").is_empty());
    }

    #[test]
    fn test_extra_tokens_after_value_are_ignored() {
        let stat = parse_stats("proxy.process.cache_total_hits 100 trailing junk\n");
        assert_eq!(stat.get("cache_hits"), Some(&100));
    }

    #[test]
    fn test_all_defined_variables_parse() {
        let text = "proxy.process.cache_total_hits 1\n\
                    proxy.process.cache_total_misses 2\n\
                    proxy.process.http.2xx_responses 3\n\
                    proxy.process.http.3xx_responses 4\n\
                    proxy.process.http.4xx_responses 5\n\
                    proxy.process.http.5xx_responses 6\n\
                    proxy.process.current_server_connections 7\n\
                    proxy.process.http.current_client_connections 8\n\
                    proxy.process.http2.current_client_connections 9\n";
        let stat = parse_stats(text);
        assert_eq!(stat.len(), 9);
        assert_eq!(stat.get("http_5xx"), Some(&6));
        assert_eq!(stat.get("conn_client_h2"), Some(&9));
    }
}
