//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (the snapshot tests below pin them down)

use crate::domain::{DatasetFit, FileManifest};

/// Per-file summary: identity, then one line per dataset.
pub fn format_file_summary(manifest: &FileManifest, fits: &[DatasetFit], axis_label: &str) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== plate {} | {} ===\n",
        manifest.plate_id, manifest.experiment
    ));
    out.push_str(
        format!(
            "{:<16} {:>12} {:>9} {:>7} {:>10} {:<16}\n",
            "dataset",
            format!("EC50 ({})", truncate(axis_label, 6)),
            "max",
            "hill",
            "rmse",
            "status"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<16} {:-<12} {:-<9} {:-<7} {:-<10} {:-<16}\n", "", "", "", "", "", "").trim_end());
    out.push('\n');

    for f in fits {
        let p = &f.fit.params;
        let ec50 = match f.fit.ec50() {
            Some(v) => format!("{v:.4e}"),
            None => "NA".to_string(),
        };
        out.push_str(
            format!(
                "{:<16} {:>12} {:>9.4} {:>7.3} {:>10.3e} {:<16}\n",
                truncate(&f.series.name, 16),
                ec50,
                p.max_response,
                p.hill,
                f.fit.quality.rmse,
                f.fit.status.label(),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
