//! Export filename conventions and header keywords.
//!
//! Two file families exist. Per-cadence snapshot files
//! (`kplr<YYYYDDDHHMMSS>_<l|s>cs-<kind>.fits`) hold one table per module/output
//! for a single cadence; series files hold a cadence range for one target
//! (`kplr<KEPLERID>-<stamp>_<l|s>pd-targ.fits`) or one module/output
//! (`kplr<MMO>-<stamp>_bkg.fits`, `_col<l|s>.fits`, `_arp.fits`).

use crate::pixel::{CadenceType, PixelCategory};

pub mod keywords {
    pub const MODULE: &str = "MODULE";
    pub const OUTPUT: &str = "OUTPUT";
    pub const KEPLER_ID: &str = "KEPLERID";
    pub const OBSMODE: &str = "OBSMODE";
    pub const DATA_TYPE: &str = "DATATYPE";
    /// Cadence number of cosmic-ray snapshot files.
    pub const CADENCE_NUMBER: &str = "CADENNUM";
    pub const LC_INTER: &str = "LC_INTER";
    pub const SC_INTER: &str = "SC_INTER";
    pub const LC_TARGET_PMRF: &str = "LCTPMTAB";
    pub const SC_TARGET_PMRF: &str = "SCTPMTAB";
    pub const BACKGROUND_PMRF: &str = "BKGPMTAB";
    pub const LC_COLLATERAL_PMRF: &str = "LCCPMTAB";
    pub const SC_COLLATERAL_PMRF: &str = "SCCPMTAB";
}

/// Length of the `YYYYDDDHHMMSS` stamp.
const STAMP_LEN: usize = 13;
const KEPLER_ID_LEN: usize = 9;

/// Kinds of per-cadence snapshot files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SnapshotKind {
    Target,
    Background,
    Collateral,
    /// Cosmic-ray corrections for target and background pixels.
    CosmicRayTarget,
    /// Cosmic-ray corrections for collateral pixels.
    CosmicRayCollateral,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 5] = [
        SnapshotKind::Target,
        SnapshotKind::Background,
        SnapshotKind::Collateral,
        SnapshotKind::CosmicRayTarget,
        SnapshotKind::CosmicRayCollateral,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            SnapshotKind::Target => "targ",
            SnapshotKind::Background => "bkg",
            SnapshotKind::Collateral => "col",
            SnapshotKind::CosmicRayTarget => "crct",
            SnapshotKind::CosmicRayCollateral => "crcc",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        SnapshotKind::ALL.into_iter().find(|k| k.suffix() == s)
    }

    /// Snapshot kind holding pixel values of a category.
    pub fn pixels(category: PixelCategory) -> Option<Self> {
        match category {
            PixelCategory::Target => Some(SnapshotKind::Target),
            PixelCategory::Background => Some(SnapshotKind::Background),
            PixelCategory::Collateral => Some(SnapshotKind::Collateral),
            PixelCategory::Arp => None,
        }
    }

    /// Snapshot kind holding cosmic-ray corrections of a category.
    pub fn cosmic_rays(category: PixelCategory) -> Option<Self> {
        match category {
            PixelCategory::Target | PixelCategory::Background => {
                Some(SnapshotKind::CosmicRayTarget)
            }
            PixelCategory::Collateral => Some(SnapshotKind::CosmicRayCollateral),
            PixelCategory::Arp => None,
        }
    }

    pub fn is_cosmic_ray(self) -> bool {
        matches!(
            self,
            SnapshotKind::CosmicRayTarget | SnapshotKind::CosmicRayCollateral
        )
    }
}

/// A parsed export filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportName {
    Snapshot {
        stamp: String,
        cadence_type: CadenceType,
        kind: SnapshotKind,
    },
    Series {
        stamp: String,
        category: PixelCategory,
        /// Present for target and collateral names.
        cadence_type: Option<CadenceType>,
        kepler_id: Option<i32>,
        module_output: Option<(i32, i32)>,
    },
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse an export filename; unrelated names yield `None`.
pub fn parse_export_name(name: &str) -> Option<ExportName> {
    let body = name.strip_prefix("kplr")?.strip_suffix(".fits")?;

    // Snapshot: <stamp>_<l|s>cs-<kind>
    if let Some((stamp, rest)) = body.split_once('_') {
        if stamp.len() == STAMP_LEN && all_digits(stamp) {
            let mut chars = rest.chars();
            let cadence_type = CadenceType::from_letter(chars.next()?)?;
            let kind = SnapshotKind::from_suffix(chars.as_str().strip_prefix("cs-")?)?;
            return Some(ExportName::Snapshot {
                stamp: stamp.to_string(),
                cadence_type,
                kind,
            });
        }
    }

    // Series: <id>-<stamp>_<suffix>
    let (id, rest) = body.split_once('-')?;
    let (stamp, suffix) = rest.split_once('_')?;
    if !all_digits(id) || stamp.len() != STAMP_LEN || !all_digits(stamp) {
        return None;
    }
    let stamp = stamp.to_string();

    if id.len() == KEPLER_ID_LEN {
        let mut chars = suffix.chars();
        let cadence_type = CadenceType::from_letter(chars.next()?)?;
        if chars.as_str() != "pd-targ" {
            return None;
        }
        return Some(ExportName::Series {
            stamp,
            category: PixelCategory::Target,
            cadence_type: Some(cadence_type),
            kepler_id: Some(id.parse().ok()?),
            module_output: None,
        });
    }

    if id.len() != 3 {
        return None;
    }
    let module: i32 = id[..2].parse().ok()?;
    let output: i32 = id[2..].parse().ok()?;
    let (category, cadence_type) = match suffix {
        "bkg" => (PixelCategory::Background, None),
        "arp" => (PixelCategory::Arp, None),
        "coll" => (PixelCategory::Collateral, Some(CadenceType::Long)),
        "cols" => (PixelCategory::Collateral, Some(CadenceType::Short)),
        _ => return None,
    };
    Some(ExportName::Series {
        stamp,
        category,
        cadence_type,
        kepler_id: None,
        module_output: Some((module, output)),
    })
}

pub fn snapshot_file_name(stamp: &str, cadence_type: CadenceType, kind: SnapshotKind) -> String {
    format!(
        "kplr{}_{}cs-{}.fits",
        stamp,
        cadence_type.letter(),
        kind.suffix()
    )
}

/// Series filename for a target (`kepler_id`) or a module/output product.
pub fn series_file_name(
    stamp: &str,
    category: PixelCategory,
    cadence_type: CadenceType,
    module: i32,
    output: i32,
    kepler_id: i32,
) -> String {
    match category {
        PixelCategory::Target => format!(
            "kplr{:09}-{}_{}pd-targ.fits",
            kepler_id,
            stamp,
            cadence_type.letter()
        ),
        PixelCategory::Background => format!("kplr{:02}{}-{}_bkg.fits", module, output, stamp),
        PixelCategory::Collateral => format!(
            "kplr{:02}{}-{}_col{}.fits",
            module,
            output,
            stamp,
            cadence_type.letter()
        ),
        PixelCategory::Arp => format!("kplr{:02}{}-{}_arp.fits", module, output, stamp),
    }
}

/// Primary-header keyword naming the PMRF file of a snapshot category.
/// Short cadence has no background pixels.
pub fn pmrf_keyword(cadence_type: CadenceType, category: PixelCategory) -> Option<&'static str> {
    use keywords::*;
    match (cadence_type, category) {
        (CadenceType::Long, PixelCategory::Target) => Some(LC_TARGET_PMRF),
        (CadenceType::Short, PixelCategory::Target) => Some(SC_TARGET_PMRF),
        (CadenceType::Long, PixelCategory::Background) => Some(BACKGROUND_PMRF),
        (CadenceType::Long, PixelCategory::Collateral) => Some(LC_COLLATERAL_PMRF),
        (CadenceType::Short, PixelCategory::Collateral) => Some(SC_COLLATERAL_PMRF),
        _ => None,
    }
}

/// Primary-header keyword carrying the cadence number of a pixel snapshot.
pub fn cadence_keyword(cadence_type: CadenceType) -> &'static str {
    match cadence_type {
        CadenceType::Long => keywords::LC_INTER,
        CadenceType::Short => keywords::SC_INTER,
    }
}
