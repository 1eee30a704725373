//! Positional column contracts of the export tables.
//!
//! Tables are read by column position, never by name. One [`SeriesLayout`] per
//! series category replaces per-category extractor code; the snapshot, PMRF and
//! cosmic-ray tables have fixed layouts of their own.

use crate::pixel::{CadenceType, PixelCategory};

/// How a table row (or vector element) maps to a `PixelKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    Pixel {
        row: usize,
        column: usize,
        /// Optimal-aperture membership, when the table carries it.
        optimal_aperture: Option<usize>,
    },
    Collateral {
        kind: usize,
        offset: usize,
        /// Target id; short-cadence collateral PMRFs only.
        target_id: Option<usize>,
    },
}

/// Snapshot pixel table: original, calibrated, uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotLayout {
    pub original: usize,
    pub calibrated: usize,
    pub uncertainty: usize,
}

pub const SNAPSHOT_PIXELS: SnapshotLayout = SnapshotLayout {
    original: 0,
    calibrated: 1,
    uncertainty: 2,
};

/// PMRF table layout for a category and cadence type.
pub fn pmrf_layout(category: PixelCategory, cadence_type: CadenceType) -> KeyLayout {
    match category {
        PixelCategory::Collateral => KeyLayout::Collateral {
            kind: 0,
            offset: 1,
            target_id: match cadence_type {
                CadenceType::Long => None,
                CadenceType::Short => Some(2),
            },
        },
        _ => KeyLayout::Pixel {
            row: 0,
            column: 1,
            optimal_aperture: None,
        },
    }
}

/// Cosmic-ray snapshot table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CosmicRayLayout {
    pub key: KeyLayout,
    pub correction: usize,
    /// Negative ids mark background pixels.
    pub target_id: Option<usize>,
}

/// `crct`: row, column, correction, target id, aperture id.
pub const COSMIC_RAY_TARGET: CosmicRayLayout = CosmicRayLayout {
    key: KeyLayout::Pixel {
        row: 0,
        column: 1,
        optimal_aperture: None,
    },
    correction: 2,
    target_id: Some(3),
};

/// `crcc`: type, offset, correction.
pub const COSMIC_RAY_COLLATERAL: CosmicRayLayout = CosmicRayLayout {
    key: KeyLayout::Collateral {
        kind: 0,
        offset: 1,
        target_id: None,
    },
    correction: 2,
    target_id: None,
};

/// Series data table (HDU 1, one row per cadence, one vector element per pixel)
/// and its pixel list (HDU 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesLayout {
    pub category: PixelCategory,
    pub time: usize,
    pub cadence: usize,
    pub raw: usize,
    pub flux: usize,
    pub flux_err: usize,
    pub background: Option<usize>,
    pub background_err: Option<usize>,
    pub cosmic_ray: usize,
    pub quality: Option<usize>,
    pub pixels: KeyLayout,
}

/// TIME, TIMECORR, CADENCENO, RAW_CNTS, FLUX, FLUX_ERR, FLUX_BKG, FLUX_BKG_ERR,
/// COSMIC_RAYS, QUALITY.
pub const TARGET_SERIES: SeriesLayout = SeriesLayout {
    category: PixelCategory::Target,
    time: 0,
    cadence: 2,
    raw: 3,
    flux: 4,
    flux_err: 5,
    background: Some(6),
    background_err: Some(7),
    cosmic_ray: 8,
    quality: Some(9),
    pixels: KeyLayout::Pixel {
        row: 0,
        column: 1,
        optimal_aperture: Some(2),
    },
};

/// TIME, TIME_BKJD, CADENCENO, RAW_CNTS, FLUX, FLUX_ERR, BKG_COEFF,
/// BKG_COEFF_ERR, COSMIC_RAYS, QUALITY, COL_CORR, ROW_CORR.
pub const BACKGROUND_SERIES: SeriesLayout = SeriesLayout {
    category: PixelCategory::Background,
    time: 0,
    cadence: 2,
    raw: 3,
    flux: 4,
    flux_err: 5,
    background: None,
    background_err: None,
    cosmic_ray: 8,
    quality: Some(9),
    pixels: KeyLayout::Pixel {
        row: 1,
        column: 0,
        optimal_aperture: None,
    },
};

/// TIME, CADENCENO, RAW_CNTS, FLUX, FLUX_ERR, COSMIC_RAYS.
pub const COLLATERAL_SERIES: SeriesLayout = SeriesLayout {
    category: PixelCategory::Collateral,
    time: 0,
    cadence: 1,
    raw: 2,
    flux: 3,
    flux_err: 4,
    background: None,
    background_err: None,
    cosmic_ray: 5,
    quality: None,
    pixels: KeyLayout::Collateral {
        kind: 0,
        offset: 1,
        target_id: None,
    },
};

/// TIME, CADENCENO, RAW_CNTS, FLUX, FLUX_ERR, COSMIC_RAYS, QUALITY.
pub const ARP_SERIES: SeriesLayout = SeriesLayout {
    category: PixelCategory::Arp,
    time: 0,
    cadence: 1,
    raw: 2,
    flux: 3,
    flux_err: 4,
    background: None,
    background_err: None,
    cosmic_ray: 5,
    quality: Some(6),
    pixels: KeyLayout::Pixel {
        row: 1,
        column: 0,
        optimal_aperture: None,
    },
};

pub fn series_layout(category: PixelCategory) -> &'static SeriesLayout {
    match category {
        PixelCategory::Target => &TARGET_SERIES,
        PixelCategory::Background => &BACKGROUND_SERIES,
        PixelCategory::Collateral => &COLLATERAL_SERIES,
        PixelCategory::Arp => &ARP_SERIES,
    }
}
