//! Key-set and tolerance diffs between task-side and FITS-side maps.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use crate::pixel::{
    is_missing_float, BackgroundValue, CosmicRayMap, PixelKey, PixelValues, ValueTriple,
};

use super::report::Comparison;

pub const TRIPLE_LEGEND: &str = "Key\tTask (orig, value, unc)\tFITS (orig, value, unc)";
pub const COSMIC_RAY_LEGEND: &str = "Key\tTask correction\tFITS correction";
pub const BACKGROUND_LEGEND: &str = "Key\tTask (bkgd, bkgd unc)\tFITS (bkgd, bkgd unc)";
pub const GAP_LEGEND: &str = "Key\tValue (orig, value, unc)";
pub const QUALITY_LEGEND: &str = "Cadence\tAssembled\tFITS";

/// `|a - b| <= tolerance`. NaN only equals NaN; infinities equal themselves.
pub fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    if a == b {
        return true;
    }
    (a - b).abs() <= tolerance
}

/// Fields of a triple that a comparison checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fields {
    Original,
    Calibrated,
    All,
}

impl Fields {
    pub fn matches(self, a: &ValueTriple, b: &ValueTriple, tolerance: f64) -> bool {
        let original = a.original == b.original;
        let calibrated = within_tolerance(a.calibrated as f64, b.calibrated as f64, tolerance)
            && within_tolerance(a.uncertainty as f64, b.uncertainty as f64, tolerance);
        match self {
            Fields::Original => original,
            Fields::Calibrated => calibrated,
            Fields::All => original && calibrated,
        }
    }
}

/// How one side marks a gapped value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapConvention {
    /// `original == -1`.
    Input,
    /// Calibrated value and uncertainty NaN or -Infinity.
    Output,
    /// `original == -1` with NaN value and uncertainty.
    Series,
}

impl GapConvention {
    pub fn admits(self, t: &ValueTriple) -> bool {
        match self {
            GapConvention::Input => t.is_original_missing(),
            GapConvention::Output => t.is_calibrated_missing(),
            GapConvention::Series => {
                t.is_original_missing() && t.calibrated.is_nan() && t.uncertainty.is_nan()
            }
        }
    }
}

/// Diffs two key-addressed maps. Every key of the union counts as one
/// compared value; a key on one side only is a mismatch.
pub fn diff_maps<V: Display>(
    cmp: &mut Comparison,
    task: &BTreeMap<PixelKey, V>,
    fits: &BTreeMap<PixelKey, V>,
    same: impl Fn(&V, &V) -> bool,
) {
    let keys: BTreeSet<&PixelKey> = task.keys().chain(fits.keys()).collect();
    cmp.count(keys.len());
    for key in keys {
        match (task.get(key), fits.get(key)) {
            (Some(t), Some(f)) => {
                if !same(t, f) {
                    cmp.mismatch(|| format!("{key}\t{t}\t{f}"));
                }
            }
            (Some(t), None) => cmp.mismatch(|| format!("{key}\t{t}\tmissing")),
            (None, Some(f)) => cmp.mismatch(|| format!("{key}\tmissing\t{f}")),
            (None, None) => {}
        }
    }
}

fn as_map(values: &PixelValues) -> BTreeMap<PixelKey, ValueTriple> {
    values.iter().map(|(k, v)| (*k, *v)).collect()
}

pub fn diff_values(
    cmp: &mut Comparison,
    task: &PixelValues,
    fits: &PixelValues,
    fields: Fields,
    tolerance: f64,
) {
    diff_maps(cmp, &as_map(task), &as_map(fits), |a, b| {
        fields.matches(a, b, tolerance)
    });
}

pub fn diff_cosmic_rays(
    cmp: &mut Comparison,
    task: &CosmicRayMap,
    fits: &CosmicRayMap,
    tolerance: f64,
) {
    diff_maps(cmp, task, fits, |a, b| {
        within_tolerance(*a as f64, *b as f64, tolerance)
    });
}

/// Printable background pair for diff lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Background(pub BackgroundValue);

impl Display for Background {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.0.value, self.0.uncertainty)
    }
}

pub fn diff_background(
    cmp: &mut Comparison,
    task: &BTreeMap<PixelKey, BackgroundValue>,
    fits: &BTreeMap<PixelKey, BackgroundValue>,
    tolerance: f64,
) {
    let wrap = |m: &BTreeMap<PixelKey, BackgroundValue>| -> BTreeMap<PixelKey, Background> {
        m.iter().map(|(k, v)| (*k, Background(*v))).collect()
    };
    diff_maps(cmp, &wrap(task), &wrap(fits), |a, b| {
        within_tolerance(a.0.value as f64, b.0.value as f64, tolerance)
            && within_tolerance(a.0.uncertainty as f64, b.0.uncertainty as f64, tolerance)
    });
}

/// Every value must follow the gap convention; other values are mismatches.
pub fn check_gaps(cmp: &mut Comparison, values: &PixelValues, convention: GapConvention) {
    cmp.count(values.len());
    for (key, triple) in values.iter() {
        if !convention.admits(triple) {
            cmp.mismatch(|| format!("{key}\t{triple}"));
        }
    }
}

/// Background of a gapped target cadence must be missing.
pub fn check_background_gaps(
    cmp: &mut Comparison,
    background: &BTreeMap<PixelKey, BackgroundValue>,
) {
    cmp.count(background.len());
    for (key, b) in background {
        if !(is_missing_float(b.value) && is_missing_float(b.uncertainty)) {
            cmp.mismatch(|| format!("{key}\t{}", Background(*b)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_boundary() {
        assert!(within_tolerance(0.0, 1e-6, 1e-6));
        assert!(!within_tolerance(0.0, 1e-6 + 1e-12, 1e-6));
        assert!(within_tolerance(0.0, -1e-6, 1e-6));
    }

    #[test]
    fn test_tolerance_special_values() {
        assert!(within_tolerance(f64::NAN, f64::NAN, 1e-6));
        assert!(!within_tolerance(f64::NAN, 0.0, 1e-6));
        assert!(within_tolerance(f64::NEG_INFINITY, f64::NEG_INFINITY, 1e-6));
        assert!(!within_tolerance(f64::NEG_INFINITY, f64::INFINITY, 1e-6));
    }

    #[test]
    fn test_fields() {
        let a = ValueTriple::new(100, 199.0, 0.2);
        let b = ValueTriple::new(0, 199.0, 0.2);
        assert!(Fields::Calibrated.matches(&a, &b, 1e-6));
        assert!(!Fields::Original.matches(&a, &b, 1e-6));
        assert!(!Fields::All.matches(&a, &b, 1e-6));
    }

    #[test]
    fn test_gap_conventions() {
        assert!(GapConvention::Input.admits(&ValueTriple::gapped_input()));
        assert!(GapConvention::Output.admits(&ValueTriple::gapped_output()));
        assert!(GapConvention::Series.admits(&ValueTriple::gapped_series()));
        assert!(!GapConvention::Series.admits(&ValueTriple::gapped_output()));
        assert!(!GapConvention::Input.admits(&ValueTriple::new(5, 0.0, 0.0)));
    }

    #[test]
    fn test_key_set_difference_is_flagged() {
        let task: PixelValues = [
            (PixelKey::pixel(1, 1), ValueTriple::original_only(5)),
            (PixelKey::pixel(1, 2), ValueTriple::original_only(6)),
        ]
        .into_iter()
        .collect();
        let fits: PixelValues = [
            (PixelKey::pixel(1, 1), ValueTriple::original_only(5)),
            (PixelKey::pixel(2, 2), ValueTriple::original_only(7)),
        ]
        .into_iter()
        .collect();
        let mut cmp = Comparison::new("keys", TRIPLE_LEGEND, 10);
        diff_values(&mut cmp, &task, &fits, Fields::Original, 1e-6);
        assert_eq!(cmp.compared(), 3);
        assert_eq!(cmp.errors(), 2);
        assert!(cmp.lines()[0].starts_with("1,2"));
        assert!(cmp.lines()[0].ends_with("missing"));
        assert!(cmp.lines()[1].starts_with("2,2\tmissing"));
    }
}
