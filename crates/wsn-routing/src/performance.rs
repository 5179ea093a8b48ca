use std::collections::HashMap;

use serde::Serialize;
use wsn_types::{Address, Payload};

/// Per-source delay samples and the derived deadline-miss ratio, keyed by
/// the measurement's originating address.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub delays: Vec<f64>,
    pub deadline_misses: usize,
    pub deadline_miss_ratio: f64,
    /// Count of delays falling in each 1-second-wide bucket up to `deadline`,
    /// with an overflow bucket at the end for anything beyond it.
    pub histogram: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub deadline: f64,
    pub sources: Vec<SourceReport>,
}

/// Reads a sink's `received_messages` log (`(t_rx, wire)` pairs, in arrival
/// order) and derives per-source end-to-end delays and deadline-miss ratios.
/// Skips anything matching `"Hello"`, `"ETX"`, or `"DAP"` — those are
/// control traffic, not application measurements.
pub fn compute(received_messages: &[(f64, String)], deadline: f64) -> PerformanceReport {
    let mut by_source: HashMap<String, Vec<f64>> = HashMap::new();

    for (t_rx, wire) in received_messages {
        let payload = match wire.splitn(3, ',').nth(2) {
            Some(p) => p,
            None => continue,
        };
        if Payload::is_hello(payload) || Payload::is_etx(payload) || Payload::is_dap(payload) {
            continue;
        }
        if let Some(Payload::Measurement { source, timestamp, .. }) = Payload::parse(payload) {
            by_source.entry(source.as_str().to_string()).or_default().push(t_rx - timestamp);
        }
    }

    let mut sources: Vec<SourceReport> = by_source
        .into_iter()
        .map(|(source, delays)| source_report(source, delays, deadline))
        .collect();
    sources.sort_by(|a, b| a.source.cmp(&b.source));

    PerformanceReport { deadline, sources }
}

fn source_report(source: String, delays: Vec<f64>, deadline: f64) -> SourceReport {
    let deadline_misses = delays.iter().filter(|&&d| d > deadline).count();
    let deadline_miss_ratio = if delays.is_empty() {
        0.0
    } else {
        deadline_misses as f64 / delays.len() as f64
    };

    let bucket_count = deadline.ceil().max(1.0) as usize + 1;
    let mut histogram = vec![0usize; bucket_count];
    for &d in &delays {
        let bucket = if d > deadline { bucket_count - 1 } else { (d.max(0.0)) as usize };
        histogram[bucket.min(bucket_count - 1)] += 1;
    }

    SourceReport {
        source,
        delays,
        deadline_misses,
        deadline_miss_ratio,
        histogram,
    }
}

/// Convenience wrapper over `compute` taking the source address directly,
/// for callers that already know which address they mean to query.
pub fn miss_ratio_for(report: &PerformanceReport, source: &Address) -> Option<f64> {
    report
        .sources
        .iter()
        .find(|s| s.source == source.as_str())
        .map(|s| s.deadline_miss_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_control_traffic_and_groups_measurements_by_source() {
        let log = vec![
            (1.0, "0,,Hello+0".to_string()),
            (5.0, "0,,ETX+0".to_string()),
            (10.0, "2,0,2/X/5.0".to_string()),
            (20.0, "3,0,3/X/18.0".to_string()),
        ];
        let report = compute(&log, 30.0);
        assert_eq!(report.sources.len(), 2);
        let source2 = report.sources.iter().find(|s| s.source == "2").unwrap();
        assert_eq!(source2.delays, vec![5.0]);
    }

    #[test]
    fn computes_deadline_miss_ratio() {
        let log = vec![
            (10.0, "1,0,1/X/0.0".to_string()),
            (50.0, "1,0,1/X/0.0".to_string()),
        ];
        let report = compute(&log, 30.0);
        let source1 = &report.sources[0];
        assert_eq!(source1.deadline_misses, 1);
        assert!((source1.deadline_miss_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_log_yields_no_sources() {
        let report = compute(&[], 30.0);
        assert!(report.sources.is_empty());
    }

    #[test]
    fn matches_the_worked_deadline_miss_ratio_example() {
        let log: Vec<(f64, String)> = [5.0, 10.0, 20.0, 25.0, 40.0]
            .iter()
            .map(|d| (*d, "1,0,1/X/0.0".to_string()))
            .collect();
        let report = compute(&log, 24.0);
        let source1 = &report.sources[0];
        assert_eq!(source1.deadline_misses, 2);
        assert!((source1.deadline_miss_ratio - 0.4).abs() < 1e-9);
    }
}
