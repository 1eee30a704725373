//! Bounded discrepancy report.
//!
//! Each diff builds a [`Comparison`] that counts every value it looked at and
//! every mismatch, but keeps at most `max_errors_displayed` detail lines. The
//! run-wide [`ValidationReport`] folds comparisons together under the same cap.

use std::fmt;

use tracing::{debug, error};

use crate::error::Error;

fn summary_line(errors: usize, compared: usize) -> String {
    let percent = if compared == 0 {
        0.0
    } else {
        errors as f64 / compared as f64 * 100.0
    };
    format!(
        "{} error{} in {} values ({:.2}%)",
        errors,
        if errors == 1 { "" } else { "s" },
        compared,
        percent
    )
}

/// One diff of one kind of value at one cadence.
#[derive(Debug, Clone)]
pub struct Comparison {
    title: String,
    legend: &'static str,
    max_lines: usize,
    compared: usize,
    errors: usize,
    lines: Vec<String>,
}

impl Comparison {
    pub fn new(title: impl Into<String>, legend: &'static str, max_lines: usize) -> Self {
        Self {
            title: title.into(),
            legend,
            max_lines,
            compared: 0,
            errors: 0,
            lines: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn count(&mut self, values: usize) {
        self.compared += values;
    }

    /// Counts a mismatch; `line` is only built while under the cap.
    pub fn mismatch(&mut self, line: impl FnOnce() -> String) {
        self.errors += 1;
        if self.lines.len() < self.max_lines {
            self.lines.push(line());
        }
    }

    pub fn compared(&self) -> usize {
        self.compared
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn truncated(&self) -> bool {
        self.errors > self.lines.len()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", self.legend)?;
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        if self.truncated() {
            writeln!(f, "...")?;
        }
        writeln!(f, "{}", summary_line(self.errors, self.compared))
    }
}

/// Totals over a whole run.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub total_compared: usize,
    pub error_count: usize,
    /// Detail lines, at most `max_errors_displayed` of them.
    pub capped_lines: Vec<String>,
    pub truncated: bool,
    /// Cadences abandoned because a file was missing or malformed.
    pub skipped_cadences: usize,
    /// Categories abandoned inside a work unit.
    pub aborted_categories: usize,
    pub units_completed: usize,
    pub units_total: usize,
    /// The time limit cut the run short.
    pub partial: bool,
    max_lines: usize,
}

impl ValidationReport {
    pub fn new(max_errors_displayed: usize) -> Self {
        Self {
            max_lines: max_errors_displayed,
            ..Default::default()
        }
    }

    pub fn equals(&self) -> bool {
        self.error_count == 0
    }

    fn push_line(&mut self, line: String) {
        if self.capped_lines.len() < self.max_lines {
            self.capped_lines.push(line);
        } else {
            self.truncated = true;
        }
    }

    /// Folds a finished comparison in and logs it.
    pub fn record(&mut self, comparison: Comparison) {
        self.total_compared += comparison.compared;
        if comparison.errors == 0 {
            debug!(
                "Validated {} values: {}",
                comparison.compared, comparison.title
            );
            return;
        }
        error!("\n{}", comparison);
        self.error_count += comparison.errors;
        if comparison.truncated() {
            self.truncated = true;
        }
        let title = comparison.title.clone();
        for line in comparison.lines {
            self.push_line(format!("{title}: {line}"));
        }
    }

    /// A standalone mismatch outside any comparison.
    pub fn record_mismatch(&mut self, line: impl Into<String>) {
        let line = line.into();
        error!("{line}");
        self.total_compared += 1;
        self.error_count += 1;
        self.push_line(line);
    }

    /// A state inconsistency, counted as one mismatch.
    pub fn record_inconsistency(&mut self, cadence: i32, err: &Error) {
        self.record_mismatch(format!("cadence {cadence}: {err}"));
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.capped_lines {
            writeln!(f, "{line}")?;
        }
        if self.truncated {
            writeln!(f, "...")?;
        }
        writeln!(f, "{}", summary_line(self.error_count, self.total_compared))?;
        if self.skipped_cadences > 0 {
            writeln!(f, "{} cadences skipped", self.skipped_cadences)?;
        }
        if self.partial {
            writeln!(
                f,
                "time limit reached after {} of {} work units",
                self.units_completed, self.units_total
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        assert_eq!(summary_line(1, 4), "1 error in 4 values (25.00%)");
        assert_eq!(summary_line(5, 10), "5 errors in 10 values (50.00%)");
        assert_eq!(summary_line(0, 0), "0 errors in 0 values (0.00%)");
    }

    #[test]
    fn test_comparison_cap() {
        let mut c = Comparison::new("Target pixels differ for cadence 7", "Key\tTask\tFITS", 3);
        c.count(10);
        for i in 0..5 {
            c.mismatch(|| format!("line {i}"));
        }
        assert_eq!(c.errors(), 5);
        assert_eq!(c.lines().len(), 3);
        let text = c.to_string();
        assert!(text.contains("line 2"));
        assert!(!text.contains("line 3"));
        assert!(text.contains("...\n"));
        assert!(text.ends_with("5 errors in 10 values (50.00%)\n"));
    }

    #[test]
    fn test_report_cap_is_global() {
        let mut report = ValidationReport::new(3);
        for cadence in 0..2 {
            let mut c = Comparison::new(format!("cadence {cadence}"), "", 3);
            c.count(4);
            c.mismatch(|| "a".to_string());
            c.mismatch(|| "b".to_string());
            report.record(c);
        }
        assert_eq!(report.error_count, 4);
        assert_eq!(report.total_compared, 8);
        assert_eq!(report.capped_lines.len(), 3);
        assert!(report.truncated);
        assert!(!report.equals());
    }

    #[test]
    fn test_clean_comparison_only_counts() {
        let mut report = ValidationReport::new(3);
        let mut c = Comparison::new("clean", "", 3);
        c.count(12);
        report.record(c);
        assert!(report.equals());
        assert_eq!(report.total_compared, 12);
        assert!(report.to_string().contains("0 errors in 12 values"));
    }
}
