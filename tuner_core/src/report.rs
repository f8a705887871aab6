//! Calibration report: one row per cavity.

use std::fmt::Write as _;
use std::path::Path;

use eyre::WrapErr;
pub use tuner_config::ReportRow;

use tuner_traits::Reading;

use crate::cavity::Cavity;
use crate::error::Result;

/// Cell text for a value that could not be read.
pub const INVALID: &str = "INVALID";

fn or_invalid<T: std::fmt::Display>(cavity: &Cavity, field: &str, r: Result<T>) -> String {
    match r {
        Ok(v) => v.to_string(),
        Err(e) => {
            tracing::warn!(cavity = %cavity.id(), field, error = %e, "report cell unreadable");
            INVALID.to_string()
        }
    }
}

fn valid_value(cavity: &Cavity, field: &str, r: Result<Reading>) -> Option<f64> {
    match r {
        Ok(r) if r.is_valid() => Some(r.value),
        Ok(_) => {
            tracing::warn!(cavity = %cavity.id(), field, "report cell invalid");
            None
        }
        Err(e) => {
            tracing::warn!(cavity = %cavity.id(), field, error = %e, "report cell unreadable");
            None
        }
    }
}

/// Snapshot the recorded calibration of each cavity. One unreadable cavity
/// only marks its own cells.
pub fn collect(cavities: &[Cavity]) -> Vec<ReportRow> {
    cavities
        .iter()
        .map(|c| ReportRow {
            cryomodule: c.id().cryomodule.clone(),
            cavity: c.id().number,
            tune_config: or_invalid(c, "tune_config", c.tune_config()),
            steps_to_cold: valid_value(c, "nsteps_cold", c.nsteps_cold())
                .map(|v| v.round() as i64),
            df_cold_hz: valid_value(c, "df_cold", c.df_cold()),
            hw_mode: or_invalid(c, "hw_mode", c.hw_mode()),
        })
        .collect()
}

const HEADERS: [&str; 6] = ["CM", "Cavity", "Tune Config", "Steps to Cold", "DF Cold (Hz)", "HW Mode"];

/// Fixed-width text table.
pub fn render_table(rows: &[ReportRow]) -> String {
    let cells: Vec<[String; 6]> = rows
        .iter()
        .map(|r| {
            [
                r.cryomodule.clone(),
                r.cavity.to_string(),
                r.tune_config.clone(),
                r.steps_to_cold
                    .map_or_else(|| INVALID.to_string(), |v| v.to_string()),
                r.df_cold_hz
                    .map_or_else(|| INVALID.to_string(), |v| format!("{v:.0}")),
                r.hw_mode.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let line = |out: &mut String, row: &[&str]| {
        let padded: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    };
    line(&mut out, &HEADERS[..]);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("  "));
    for row in &cells {
        let refs: Vec<&str> = row.iter().map(String::as_str).collect();
        line(&mut out, &refs);
    }
    out
}

/// Write the report as CSV, replacing `path` atomically.
pub fn write_csv_file(path: &Path, rows: &[ReportRow]) -> Result<()> {
    let mut buf = Vec::new();
    tuner_config::write_report_csv(&mut buf, rows)?;
    crate::atomic::write_atomic(path, &buf)
        .wrap_err_with(|| format!("write report {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cm: &str, cav: u8, cfg: &str) -> ReportRow {
        ReportRow {
            cryomodule: cm.into(),
            cavity: cav,
            tune_config: cfg.into(),
            steps_to_cold: Some(120_000),
            df_cold_hz: Some(-45_123.4),
            hw_mode: "Online".into(),
        }
    }

    #[test]
    fn table_aligns_columns() {
        let t = render_table(&[row("02", 1, "Resonance"), row("H1", 8, "Cold")]);
        let lines: Vec<&str> = t.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("CM  Cavity  Tune Config"));
        assert!(lines[2].starts_with("02  1       Resonance"));
        assert!(lines[3].contains("-45123"));
        let col = lines[0].find("Tune Config").unwrap();
        assert_eq!(&lines[3][col..col + 4], "Cold");
    }

    #[test]
    fn unreadable_cells_render_as_invalid() {
        let mut r = row("02", 2, INVALID);
        r.steps_to_cold = None;
        r.df_cold_hz = None;
        let t = render_table(&[r]);
        let last = t.lines().last().unwrap();
        assert_eq!(last.matches(INVALID).count(), 3);
        assert!(last.ends_with("Online"));
    }

    #[test]
    fn empty_report_is_just_headers() {
        assert_eq!(render_table(&[]).lines().count(), 2);
    }
}
