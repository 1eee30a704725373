//! Pixel addressing and per-pixel values.
//!
//! Every extractor and the diff engine address data through [`PixelKey`]: either a
//! visible-CCD [`Pixel`] at `(row, column)` or a [`CollateralKey`] at
//! `(type, offset)`. Masked and virtual black are single-valued per readout, so
//! their keys always normalize to offset 0.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{Error, Result};

/// Raw (original) value of a gapped or absent pixel.
pub const MISSING_PIXEL_VALUE: i32 = -1;
/// Calibrated value or uncertainty of a gapped pixel in calibration outputs.
pub const MISSING_CAL_PIXEL_VALUE: f32 = f32::NEG_INFINITY;
/// Value written for columns the export format does not carry.
pub const FITS_FILL_VALUE: f32 = 0.0;

// ── Cadence type ────────────────────────────────────────────────────────────

/// Long (~29.4 min) or short (~58.8 s) cadence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, Serialize, Deserialize,
)]
pub enum CadenceType {
    Long,
    Short,
}

impl CadenceType {
    /// Letter used in export filenames.
    pub fn letter(self) -> char {
        match self {
            CadenceType::Long => 'l',
            CadenceType::Short => 's',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'l' => Some(CadenceType::Long),
            's' => Some(CadenceType::Short),
            _ => None,
        }
    }

    /// Value of the DATATYPE and OBSMODE header keywords.
    pub fn data_type(self) -> &'static str {
        match self {
            CadenceType::Long => "long cadence",
            CadenceType::Short => "short cadence",
        }
    }

    /// Parse a DATATYPE/OBSMODE string ("long cadence", "short cadence").
    pub fn from_data_type(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s.starts_with("long ") {
            Some(CadenceType::Long)
        } else if s.starts_with("short ") {
            Some(CadenceType::Short)
        } else {
            None
        }
    }
}

impl fmt::Display for CadenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.data_type())
    }
}

// ── Pixel categories ────────────────────────────────────────────────────────

/// The kinds of pixels an export carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PixelCategory {
    Target,
    Background,
    Collateral,
    /// Artifact-removal pixels; a target-pixel subset with its own series file.
    Arp,
}

impl PixelCategory {
    pub fn name(self) -> &'static str {
        match self {
            PixelCategory::Target => "target",
            PixelCategory::Background => "background",
            PixelCategory::Collateral => "collateral",
            PixelCategory::Arp => "arp",
        }
    }

    /// Categories present for a cadence type. Short cadence has no background pixels.
    pub fn snapshot_categories(cadence_type: CadenceType) -> &'static [PixelCategory] {
        match cadence_type {
            CadenceType::Long => &[
                PixelCategory::Target,
                PixelCategory::Background,
                PixelCategory::Collateral,
            ],
            CadenceType::Short => &[PixelCategory::Target, PixelCategory::Collateral],
        }
    }
}

impl fmt::Display for PixelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Pixel ───────────────────────────────────────────────────────────────────

/// A visible-CCD pixel on one module/output. Equality ignores the aperture flag.
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
pub struct Pixel {
    pub row: i32,
    pub column: i32,
    pub in_optimal_aperture: bool,
}

impl Pixel {
    pub fn new(row: i32, column: i32) -> Self {
        Self {
            row,
            column,
            in_optimal_aperture: false,
        }
    }

    pub fn with_aperture(row: i32, column: i32, in_optimal_aperture: bool) -> Self {
        Self {
            row,
            column,
            in_optimal_aperture,
        }
    }
}

impl PartialEq for Pixel {
    fn eq(&self, other: &Self) -> bool {
        self.row == other.row && self.column == other.column
    }
}

impl Eq for Pixel {}

impl Hash for Pixel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.row.hash(state);
        self.column.hash(state);
    }
}

impl PartialOrd for Pixel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pixel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.row, self.column).cmp(&(other.row, other.column))
    }
}

// ── Collateral ──────────────────────────────────────────────────────────────

/// Collateral pixel type, with the byte code used in collateral PMRF and
/// cosmic-ray tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, Serialize, Deserialize,
)]
pub enum CollateralType {
    BlackLevel,
    BlackMasked,
    BlackVirtual,
    MaskedSmear,
    VirtualSmear,
}

impl CollateralType {
    pub const ALL: [CollateralType; 5] = [
        CollateralType::BlackLevel,
        CollateralType::BlackMasked,
        CollateralType::BlackVirtual,
        CollateralType::MaskedSmear,
        CollateralType::VirtualSmear,
    ];

    pub fn code(self) -> u8 {
        match self {
            CollateralType::BlackLevel => 1,
            CollateralType::BlackMasked => 2,
            CollateralType::BlackVirtual => 3,
            CollateralType::MaskedSmear => 4,
            CollateralType::VirtualSmear => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        CollateralType::ALL
            .into_iter()
            .find(|t| i32::from(t.code()) == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            CollateralType::BlackLevel => "BLACK_LEVEL",
            CollateralType::BlackMasked => "BLACK_MASKED",
            CollateralType::BlackVirtual => "BLACK_VIRTUAL",
            CollateralType::MaskedSmear => "MASKED_SMEAR",
            CollateralType::VirtualSmear => "VIRTUAL_SMEAR",
        }
    }

    /// Masked and virtual black carry one value per readout.
    pub fn is_single(self) -> bool {
        matches!(
            self,
            CollateralType::BlackMasked | CollateralType::BlackVirtual
        )
    }

    /// Black types are offset by row; smear types by column.
    pub fn is_row_offset(self) -> bool {
        matches!(
            self,
            CollateralType::BlackLevel | CollateralType::BlackMasked | CollateralType::BlackVirtual
        )
    }
}

impl fmt::Display for CollateralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A collateral pixel addressed by type and row/column offset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, Serialize, Deserialize,
)]
pub struct CollateralKey {
    pub kind: CollateralType,
    pub offset: i32,
}

impl CollateralKey {
    /// Builds a key, collapsing single-valued types onto offset 0.
    pub fn new(kind: CollateralType, offset: i32) -> Self {
        let offset = if kind.is_single() { 0 } else { offset };
        Self { kind, offset }
    }
}

// ── PixelKey ────────────────────────────────────────────────────────────────

/// Address of one value stream: a visible pixel or a collateral key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, Serialize, Deserialize,
)]
pub enum PixelKey {
    Pixel(Pixel),
    Collateral(CollateralKey),
}

impl PixelKey {
    pub fn pixel(row: i32, column: i32) -> Self {
        PixelKey::Pixel(Pixel::new(row, column))
    }

    pub fn collateral(kind: CollateralType, offset: i32) -> Self {
        PixelKey::Collateral(CollateralKey::new(kind, offset))
    }

    /// Re-applies collateral normalization to a key built field by field.
    pub fn normalized(self) -> Self {
        match self {
            PixelKey::Collateral(c) => PixelKey::collateral(c.kind, c.offset),
            pixel => pixel,
        }
    }

    pub fn as_pixel(&self) -> Option<&Pixel> {
        match self {
            PixelKey::Pixel(p) => Some(p),
            PixelKey::Collateral(_) => None,
        }
    }

    pub fn as_collateral(&self) -> Option<&CollateralKey> {
        match self {
            PixelKey::Pixel(_) => None,
            PixelKey::Collateral(c) => Some(c),
        }
    }
}

impl fmt::Display for PixelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelKey::Pixel(p) => write!(f, "{},{}", p.row, p.column),
            PixelKey::Collateral(c) => write!(f, "{},{}", c.kind, c.offset),
        }
    }
}

impl From<Pixel> for PixelKey {
    fn from(p: Pixel) -> Self {
        PixelKey::Pixel(p)
    }
}

impl From<CollateralKey> for PixelKey {
    fn from(c: CollateralKey) -> Self {
        PixelKey::Collateral(c)
    }
}

// ── Values ──────────────────────────────────────────────────────────────────

/// Original, calibrated and uncertainty values of one pixel at one cadence.
#[derive(Debug, Clone, Copy)]
pub struct ValueTriple {
    pub original: i32,
    pub calibrated: f32,
    pub uncertainty: f32,
}

impl ValueTriple {
    pub fn new(original: i32, calibrated: f32, uncertainty: f32) -> Self {
        Self {
            original,
            calibrated,
            uncertainty,
        }
    }

    /// A raw value from a table that carries no calibrated columns.
    pub fn original_only(original: i32) -> Self {
        Self::new(original, FITS_FILL_VALUE, FITS_FILL_VALUE)
    }

    /// Gap convention of calibration inputs.
    pub fn gapped_input() -> Self {
        Self::new(MISSING_PIXEL_VALUE, FITS_FILL_VALUE, FITS_FILL_VALUE)
    }

    /// Gap convention of calibration outputs.
    pub fn gapped_output() -> Self {
        Self::new(0, MISSING_CAL_PIXEL_VALUE, MISSING_CAL_PIXEL_VALUE)
    }

    /// Gap convention of cadence-series exports.
    pub fn gapped_series() -> Self {
        Self::new(MISSING_PIXEL_VALUE, f32::NAN, f32::NAN)
    }

    pub fn is_original_missing(&self) -> bool {
        self.original == MISSING_PIXEL_VALUE
    }

    /// Both float fields hold a missing marker (NaN or -Infinity).
    pub fn is_calibrated_missing(&self) -> bool {
        is_missing_float(self.calibrated) && is_missing_float(self.uncertainty)
    }

    /// Bitwise identity, so NaN fields compare equal to NaN.
    pub fn same_as(&self, other: &ValueTriple) -> bool {
        self.original == other.original
            && self.calibrated.to_bits() == other.calibrated.to_bits()
            && self.uncertainty.to_bits() == other.uncertainty.to_bits()
    }
}

impl fmt::Display for ValueTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.original, self.calibrated, self.uncertainty
        )
    }
}

/// NaN or -Infinity.
pub fn is_missing_float(v: f32) -> bool {
    v.is_nan() || v == MISSING_CAL_PIXEL_VALUE
}

/// Background estimate for one target pixel at one cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundValue {
    pub value: f32,
    pub uncertainty: f32,
}

/// Sparse cosmic-ray corrections for one cadence.
pub type CosmicRayMap = BTreeMap<PixelKey, f32>;

/// Adds a correction; a repeated key must carry the same correction.
pub fn insert_cosmic_ray(map: &mut CosmicRayMap, key: PixelKey, delta: f32) -> Result<()> {
    match map.get(&key) {
        Some(existing) if existing.to_bits() != delta.to_bits() => Err(Error::StateInconsistency(
            format!("cosmic ray for {key} is both {existing} and {delta}"),
        )),
        Some(_) => Ok(()),
        None => {
            map.insert(key, delta);
            Ok(())
        }
    }
}

// ── PixelValues ─────────────────────────────────────────────────────────────

/// Key-addressed triples for one cadence.
///
/// Within one target, inserting a key twice is allowed only when both
/// insertions carry the same triple, which is how normalized masked/virtual
/// black keys collide; differing triples are a state inconsistency. Short
/// cadence collateral repeats keys across targets, and there the last
/// insertion wins.
#[derive(Debug, Clone, Default)]
pub struct PixelValues {
    values: BTreeMap<PixelKey, ValueTriple>,
    target_ids: BTreeMap<PixelKey, i32>,
}

impl PixelValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PixelKey, value: ValueTriple) -> Result<()> {
        self.insert_with_target(key, value, 0)
    }

    pub fn insert_with_target(
        &mut self,
        key: PixelKey,
        value: ValueTriple,
        target_id: i32,
    ) -> Result<()> {
        if let Some(existing) = self.values.get(&key) {
            let existing_target = self.target_ids.get(&key).copied().unwrap_or(0);
            if existing_target == target_id {
                if !existing.same_as(&value) {
                    return Err(Error::StateInconsistency(format!(
                        "key {} maps to {} and {} in target {}",
                        key, existing, value, target_id
                    )));
                }
                return Ok(());
            }
        }
        self.values.insert(key, value);
        self.target_ids.insert(key, target_id);
        Ok(())
    }

    /// Merges another map under the same collision policy.
    pub fn merge(&mut self, other: PixelValues) -> Result<()> {
        for (key, value) in other.values {
            let target_id = other.target_ids.get(&key).copied().unwrap_or(0);
            self.insert_with_target(key, value, target_id)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &PixelKey) -> Option<&ValueTriple> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &PixelKey) -> Option<&mut ValueTriple> {
        self.values.get_mut(key)
    }

    pub fn contains_key(&self, key: &PixelKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PixelKey> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PixelKey, &ValueTriple)> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PixelKey, &mut ValueTriple)> {
        self.values.iter_mut()
    }

    /// Keeps only keys for which `f` returns true.
    pub fn retain(&mut self, mut f: impl FnMut(&PixelKey) -> bool) {
        self.values.retain(|k, _| f(k));
        self.target_ids.retain(|k, _| f(k));
    }
}

impl FromIterator<(PixelKey, ValueTriple)> for PixelValues {
    /// Collects without collision checks; later entries win.
    fn from_iter<I: IntoIterator<Item = (PixelKey, ValueTriple)>>(iter: I) -> Self {
        let mut out = PixelValues::new();
        for (k, v) in iter {
            out.values.insert(k, v);
            out.target_ids.insert(k, 0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_collateral_normalizes_to_zero() {
        let a = CollateralKey::new(CollateralType::BlackMasked, 5);
        let b = CollateralKey::new(CollateralType::BlackMasked, 7);
        assert_eq!(a, b);
        assert_eq!(a.offset, 0);
        let v = CollateralKey::new(CollateralType::BlackVirtual, 1070);
        assert_eq!(v.offset, 0);
        let black = CollateralKey::new(CollateralType::BlackLevel, 5);
        assert_eq!(black.offset, 5);
    }

    #[test]
    fn test_pixel_equality_ignores_aperture() {
        let a = Pixel::with_aperture(10, 20, true);
        let b = Pixel::new(10, 20);
        assert_eq!(a, b);
        assert_eq!(PixelKey::from(a), PixelKey::pixel(10, 20));
    }

    #[test]
    fn test_collateral_codes_roundtrip() {
        for t in CollateralType::ALL {
            assert_eq!(CollateralType::from_code(i32::from(t.code())), Some(t));
        }
        assert_eq!(CollateralType::from_code(0), None);
        assert_eq!(CollateralType::from_code(6), None);
    }

    #[test]
    fn test_collision_with_identical_triple_is_tolerated() {
        let key = PixelKey::collateral(CollateralType::BlackMasked, 5);
        let mut values = PixelValues::new();
        values
            .insert(key, ValueTriple::new(700, 12.5, 0.3))
            .unwrap();
        values
            .insert(
                PixelKey::collateral(CollateralType::BlackMasked, 7),
                ValueTriple::new(700, 12.5, 0.3),
            )
            .unwrap();
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_collision_with_different_triple_is_inconsistent() {
        let mut values = PixelValues::new();
        values
            .insert(
                PixelKey::collateral(CollateralType::BlackVirtual, 1),
                ValueTriple::new(700, 12.5, 0.3),
            )
            .unwrap();
        let err = values
            .insert(
                PixelKey::collateral(CollateralType::BlackVirtual, 2),
                ValueTriple::new(701, 12.5, 0.3),
            )
            .unwrap_err();
        assert!(matches!(err, Error::StateInconsistency(_)));
    }

    #[test]
    fn test_collision_across_targets_keeps_last() {
        let key = PixelKey::collateral(CollateralType::BlackLevel, 5);
        let mut values = PixelValues::new();
        values
            .insert_with_target(key, ValueTriple::new(410, 2.0, 3.0), 1001)
            .unwrap();
        values
            .insert_with_target(key, ValueTriple::new(410, 2.0, 3.0), 1002)
            .unwrap();
        values
            .insert_with_target(key, ValueTriple::new(411, 2.5, 3.0), 1003)
            .unwrap();
        assert_eq!(values.len(), 1);
        assert!(values.get(&key).unwrap().same_as(&ValueTriple::new(411, 2.5, 3.0)));

        // Still checked within the winning target.
        assert!(matches!(
            values.insert_with_target(key, ValueTriple::new(412, 2.5, 3.0), 1003),
            Err(Error::StateInconsistency(_))
        ));
    }

    #[test]
    fn test_sentinels() {
        assert!(ValueTriple::gapped_series().is_original_missing());
        assert!(ValueTriple::gapped_series().is_calibrated_missing());
        assert!(ValueTriple::gapped_output().is_calibrated_missing());
        assert!(!ValueTriple::gapped_output().is_original_missing());
        assert!(ValueTriple::gapped_input().is_original_missing());
        assert!(!ValueTriple::gapped_input().is_calibrated_missing());
        assert!(ValueTriple::gapped_series().same_as(&ValueTriple::gapped_series()));
    }

    #[test]
    fn test_duplicate_cosmic_ray_must_agree() {
        let mut map = CosmicRayMap::new();
        let key = PixelKey::pixel(1, 2);
        insert_cosmic_ray(&mut map, key, 3.5).unwrap();
        insert_cosmic_ray(&mut map, key, 3.5).unwrap();
        assert!(insert_cosmic_ray(&mut map, key, 4.0).is_err());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(PixelKey::pixel(10, 20).to_string(), "10,20");
        assert_eq!(
            PixelKey::collateral(CollateralType::MaskedSmear, 300).to_string(),
            "MASKED_SMEAR,300"
        );
    }

    #[test]
    fn test_cadence_type_parsing() {
        assert_eq!(
            CadenceType::from_data_type("long cadence"),
            Some(CadenceType::Long)
        );
        assert_eq!(
            CadenceType::from_data_type("SHORT CADENCE"),
            Some(CadenceType::Short)
        );
        assert_eq!(CadenceType::from_data_type("ffi"), None);
        assert_eq!(CadenceType::from_letter('s'), Some(CadenceType::Short));
    }
}
