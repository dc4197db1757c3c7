//! Report rendering: absolute values for the first report, then values with
//! a signed percentage change against the baseline.

use super::MemorySnapshot;

/// Percentage change of `current` relative to `baseline`, rounded to two
/// decimals. `None` when the baseline is zero.
pub fn percent_change(baseline: u64, current: u64) -> Option<f64> {
    if baseline == 0 {
        return None;
    }
    let pct = 100.0 * (current as f64 - baseline as f64) / baseline as f64;
    let rounded = (pct * 100.0).round() / 100.0;
    // Rounding a tiny negative change yields -0.0, which must print as +0.00.
    Some(if rounded == 0.0 { 0.0 } else { rounded })
}

/// Formats the change column: `+1.25%`, `-0.50%`, or `n/a`.
pub fn format_change(baseline: u64, current: u64) -> String {
    match percent_change(baseline, current) {
        Some(pct) => format!("{:+.2}%", pct),
        None => "n/a".to_string(),
    }
}

/// Renders a memory report.
///
/// Without a baseline the three counters are printed as absolute values;
/// the caller is expected to latch `current` as the baseline afterwards.
pub fn render_report(baseline: Option<&MemorySnapshot>, current: &MemorySnapshot) -> String {
    let mut out = String::new();
    match baseline {
        None => {
            out.push_str("Initial memory usage:\n");
            for (label, value) in current.metrics() {
                out.push_str(&format!("{}: {}\n", label, value));
            }
        }
        Some(base) => {
            out.push_str("Current memory usage:\n");
            let rows = current.metrics().into_iter().zip(base.metrics());
            for ((label, value), (_, base_value)) in rows {
                out.push_str(&format!(
                    "{}: {} ({})\n",
                    label,
                    value,
                    format_change(base_value, value)
                ));
            }
        }
    }
    out
}
