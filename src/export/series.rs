//! Decoded cadence-series export files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fits::{Column, FitsFile};
use crate::pixel::{BackgroundValue, CosmicRayMap, PixelKey, PixelValues, ValueTriple};

use super::decode_keys;
use super::layout::SeriesLayout;
use super::naming::keywords;

/// One series file: per-cadence rows whose vector columns hold one element per
/// pixel of the HDU 2 pixel list.
#[derive(Debug)]
pub struct SeriesData {
    pub path: PathBuf,
    pub kepler_id: Option<i32>,
    pub cadences: Vec<i32>,
    pub keys: Vec<PixelKey>,
    raw: Column<i32>,
    flux: Column<f32>,
    flux_err: Column<f32>,
    background: Option<(Column<f32>, Column<f32>)>,
    cosmic_ray: Column<f32>,
    quality: Option<Vec<i32>>,
}

impl SeriesData {
    pub fn load(path: &Path, layout: &SeriesLayout) -> Result<Self> {
        let fits = FitsFile::open(path)?;
        let kepler_id = fits
            .hdu(0)?
            .header
            .get_i64(keywords::KEPLER_ID)
            .and_then(|v| i32::try_from(v).ok());

        let pixel_list = fits.bintable(2)?;
        let keys: Vec<PixelKey> = decode_keys(&pixel_list, layout.pixels)?
            .into_iter()
            .map(|(k, _)| k)
            .collect();

        let table = fits.bintable(1)?;
        let cadences = table.read_i32(layout.cadence)?.values;
        let raw = table.read_i32(layout.raw)?;
        let flux = table.read_f32(layout.flux)?;
        let flux_err = table.read_f32(layout.flux_err)?;
        let cosmic_ray = table.read_f32(layout.cosmic_ray)?;
        let background = match (layout.background, layout.background_err) {
            (Some(b), Some(e)) => Some((table.read_f32(b)?, table.read_f32(e)?)),
            _ => None,
        };
        let quality = match layout.quality {
            Some(q) => Some(table.read_i32(q)?.values),
            None => None,
        };

        let mut widths = vec![raw.repeat, flux.repeat, flux_err.repeat, cosmic_ray.repeat];
        if let Some((b, e)) = &background {
            widths.extend([b.repeat, e.repeat]);
        }
        if let Some(w) = widths.iter().find(|&&w| w != keys.len()) {
            return Err(Error::StateInconsistency(format!(
                "{}: pixel list has {} entries but data vectors have {} elements",
                path.display(),
                keys.len(),
                w
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            kepler_id,
            cadences,
            keys,
            raw,
            flux,
            flux_err,
            background,
            cosmic_ray,
            quality,
        })
    }

    pub fn start_cadence(&self) -> Option<i32> {
        self.cadences.first().copied()
    }

    pub fn end_cadence(&self) -> Option<i32> {
        self.cadences.last().copied()
    }

    /// Table row of a cadence: `cadence - first cadence`, checked against the
    /// cadence column.
    pub fn row_for(&self, cadence: i32) -> Result<usize> {
        let first = self
            .start_cadence()
            .ok_or_else(|| Error::format(&self.path, "series table has no rows"))?;
        let row = usize::try_from(cadence - first)
            .ok()
            .filter(|&r| r < self.cadences.len())
            .ok_or_else(|| {
                Error::format(&self.path, format!("cadence {cadence} is outside the file"))
            })?;
        if self.cadences[row] != cadence {
            return Err(Error::format(
                &self.path,
                format!(
                    "row {} holds cadence {}, expected {}",
                    row, self.cadences[row], cadence
                ),
            ));
        }
        Ok(row)
    }

    /// Raw, flux and flux-error triples at a table row.
    pub fn values(&self, row: usize) -> Result<PixelValues> {
        let (raw, flux, err) = match (self.raw.row(row), self.flux.row(row), self.flux_err.row(row))
        {
            (Some(r), Some(f), Some(e)) => (r, f, e),
            _ => return Err(Error::format(&self.path, format!("row {row} out of range"))),
        };
        let mut values = PixelValues::new();
        for (i, key) in self.keys.iter().enumerate() {
            values.insert(*key, ValueTriple::new(raw[i], flux[i], err[i]))?;
        }
        Ok(values)
    }

    /// Background and its uncertainty at a table row, for layouts that carry it.
    pub fn background(&self, row: usize) -> Option<Vec<(PixelKey, BackgroundValue)>> {
        let (b, e) = self.background.as_ref()?;
        let (b, e) = (b.row(row)?, e.row(row)?);
        Some(
            self.keys
                .iter()
                .enumerate()
                .map(|(i, k)| {
                    (
                        *k,
                        BackgroundValue {
                            value: b[i],
                            uncertainty: e[i],
                        },
                    )
                })
                .collect(),
        )
    }

    /// Non-NaN cosmic-ray corrections at a table row.
    pub fn cosmic_rays(&self, row: usize) -> CosmicRayMap {
        let Some(values) = self.cosmic_ray.row(row) else {
            return CosmicRayMap::new();
        };
        self.keys
            .iter()
            .zip(values)
            .filter(|(_, v)| !v.is_nan())
            .map(|(k, v)| (*k, *v))
            .collect()
    }

    pub fn quality(&self, row: usize) -> Option<i32> {
        self.quality.as_ref()?.get(row).copied()
    }

    pub fn has_quality(&self) -> bool {
        self.quality.is_some()
    }

    /// Pixels flagged as members of the optimal aperture.
    pub fn optimal_aperture(&self) -> BTreeSet<PixelKey> {
        self.keys
            .iter()
            .filter(|k| k.as_pixel().is_some_and(|p| p.in_optimal_aperture))
            .copied()
            .collect()
    }
}
