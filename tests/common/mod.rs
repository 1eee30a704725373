//! Fixture builders shared by the integration tests: a minimal FITS writer and
//! helpers that lay out export directories and task artifacts the way the
//! pipeline writes them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use fitscheck::task::{
    ArtifactHeader, CalInputs, CalOutputs, CalibratedSeries, CosmicRayEvent, PaOutputs,
    RawSeries, TaskArtifact,
};
use fitscheck::{
    CadenceFlags, CadenceRecord, CadenceTimes, CadenceType, PixelKey, SpacecraftConfig,
    SpacecraftConfigHistory,
};

pub const MODULE: i32 = 2;
pub const OUTPUT: i32 = 1;
pub const FIRST_MJD: f64 = 55000.0;
pub const MJD_STEP: f64 = 0.0204;

const BLOCK_LEN: usize = 2880;

// ── FITS writer ─────────────────────────────────────────────────────────────

pub fn int_card(key: &str, v: i64) -> String {
    format!("{:<8}= {:>20}", key, v)
}

pub fn str_card(key: &str, v: &str) -> String {
    format!("{:<8}= '{}'", key, v)
}

fn pad(out: &mut Vec<u8>, fill: u8) {
    out.resize(out.len().div_ceil(BLOCK_LEN) * BLOCK_LEN, fill);
}

fn header_bytes(cards: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for c in cards {
        out.extend_from_slice(format!("{:<80}", c).as_bytes());
    }
    out.extend_from_slice(format!("{:<80}", "END").as_bytes());
    pad(&mut out, b' ');
    out
}

/// One column: TFORM code, repeat count and big-endian bytes in row order.
struct TableColumn {
    name: String,
    code: char,
    repeat: usize,
    data: Vec<u8>,
}

impl TableColumn {
    fn width(&self) -> usize {
        let size = match self.code {
            'L' | 'B' => 1,
            'J' | 'E' => 4,
            _ => 8,
        };
        size * self.repeat
    }
}

/// A binary-table extension under construction.
pub struct Table {
    rows: usize,
    cards: Vec<String>,
    columns: Vec<TableColumn>,
}

impl Table {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            cards: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// A table tagged with the fixture module/output.
    pub fn for_channel(rows: usize) -> Self {
        Self::new(rows)
            .card(int_card("MODULE", i64::from(MODULE)))
            .card(int_card("OUTPUT", i64::from(OUTPUT)))
    }

    pub fn card(mut self, card: String) -> Self {
        self.cards.push(card);
        self
    }

    fn push(mut self, name: &str, code: char, repeat: usize, data: Vec<u8>) -> Self {
        self.columns.push(TableColumn {
            name: name.to_string(),
            code,
            repeat,
            data,
        });
        self
    }

    /// `repeat` values per row, row-major.
    pub fn i32s(self, name: &str, repeat: usize, values: &[i32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.push(name, 'J', repeat, data)
    }

    pub fn f32s(self, name: &str, repeat: usize, values: &[f32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.push(name, 'E', repeat, data)
    }

    pub fn f64s(self, name: &str, values: &[f64]) -> Self {
        let data = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.push(name, 'D', 1, data)
    }

    pub fn bools(self, name: &str, values: &[bool]) -> Self {
        let data = values.iter().map(|&b| if b { b'T' } else { b'F' }).collect();
        self.push(name, 'L', 1, data)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let row_bytes: usize = self.columns.iter().map(TableColumn::width).sum();
        let mut cards = vec![
            str_card("XTENSION", "BINTABLE"),
            int_card("BITPIX", 8),
            int_card("NAXIS", 2),
            int_card("NAXIS1", row_bytes as i64),
            int_card("NAXIS2", self.rows as i64),
            int_card("PCOUNT", 0),
            int_card("GCOUNT", 1),
            int_card("TFIELDS", self.columns.len() as i64),
        ];
        for (i, c) in self.columns.iter().enumerate() {
            cards.push(str_card(&format!("TTYPE{}", i + 1), &c.name));
            cards.push(str_card(&format!("TFORM{}", i + 1), &format!("{}{}", c.repeat, c.code)));
        }
        cards.extend(self.cards.iter().cloned());

        let mut out = header_bytes(&cards);
        for r in 0..self.rows {
            for c in &self.columns {
                let w = c.width();
                out.extend_from_slice(&c.data[r * w..(r + 1) * w]);
            }
        }
        pad(&mut out, 0);
        out
    }
}

/// Writes a primary header (no data) followed by the given tables.
pub fn write_fits(path: &Path, primary: &[String], tables: &[Table]) {
    let mut cards = vec![
        "SIMPLE  =                    T".to_string(),
        int_card("BITPIX", 8),
        int_card("NAXIS", 0),
        "EXTEND  =                    T".to_string(),
    ];
    cards.extend(primary.iter().cloned());
    let mut bytes = header_bytes(&cards);
    for t in tables {
        bytes.extend(t.to_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}

// ── Cadences and spacecraft ─────────────────────────────────────────────────

pub fn mid_mjd(cadence: i32) -> f64 {
    FIRST_MJD + f64::from(cadence) * MJD_STEP
}

/// Long-cadence times for `start..=end`, fine point throughout.
pub fn cadence_times(start: i32, end: i32, gapped: &[i32]) -> CadenceTimes {
    cadence_times_of(CadenceType::Long, start, end, gapped)
}

pub fn cadence_times_of(
    cadence_type: CadenceType,
    start: i32,
    end: i32,
    gapped: &[i32],
) -> CadenceTimes {
    let records = (start..=end)
        .map(|cadence| CadenceRecord {
            cadence,
            mid_mjd: mid_mjd(cadence),
            gapped: gapped.contains(&cadence),
            flags: CadenceFlags {
                fine_point: true,
                ..Default::default()
            },
        })
        .collect();
    CadenceTimes::new(cadence_type, records).unwrap()
}

/// A configuration giving `seconds` per long cadence.
pub fn spacecraft(seconds: f64) -> SpacecraftConfigHistory {
    SpacecraftConfigHistory::new(vec![SpacecraftConfig {
        mjd: FIRST_MJD - 100.0,
        fgs_frames_per_integration: 1,
        millis_per_fgs_frame: seconds * 1000.0 + 100.0,
        millis_per_readout: 100.0,
        integrations_per_short_cadence: 1,
        short_cadences_per_long_cadence: 1,
    }])
}

/// 13-digit timestamp unique to a cadence.
pub fn stamp(cadence: i32) -> String {
    format!("2009{:09}", cadence)
}

// ── Snapshot exports ────────────────────────────────────────────────────────

/// Long-cadence pixel snapshot. `calibrated` of `None` writes only the
/// original column.
pub fn write_snapshot(
    dir: &Path,
    suffix: &str,
    pmrf_keyword: &str,
    pmrf_name: &str,
    cadence: i32,
    original: &[i32],
    calibrated: Option<(&[f32], &[f32])>,
) -> PathBuf {
    write_snapshot_of(
        dir,
        CadenceType::Long,
        suffix,
        pmrf_keyword,
        pmrf_name,
        cadence,
        original,
        calibrated,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn write_snapshot_of(
    dir: &Path,
    cadence_type: CadenceType,
    suffix: &str,
    pmrf_keyword: &str,
    pmrf_name: &str,
    cadence: i32,
    original: &[i32],
    calibrated: Option<(&[f32], &[f32])>,
) -> PathBuf {
    let (letter, cadence_card) = match cadence_type {
        CadenceType::Long => ('l', "LC_INTER"),
        CadenceType::Short => ('s', "SC_INTER"),
    };
    let path = dir.join(format!("kplr{}_{}cs-{}.fits", stamp(cadence), letter, suffix));
    let mut table = Table::for_channel(original.len()).i32s("orig_value", 1, original);
    if let Some((cal, unc)) = calibrated {
        table = table
            .f32s("cal_value", 1, cal)
            .f32s("cal_uncert", 1, unc);
    }
    write_fits(
        &path,
        &[
            int_card(cadence_card, i64::from(cadence)),
            str_card(pmrf_keyword, pmrf_name),
        ],
        &[table],
    );
    path
}

/// Visible-pixel PMRF (row, column per table row).
pub fn write_pixel_pmrf(dir: &Path, name: &str, pixels: &[(i32, i32)]) {
    let rows: Vec<i32> = pixels.iter().map(|p| p.0).collect();
    let cols: Vec<i32> = pixels.iter().map(|p| p.1).collect();
    write_fits(
        &dir.join(name),
        &[],
        &[Table::for_channel(pixels.len())
            .i32s("row", 1, &rows)
            .i32s("column", 1, &cols)],
    );
}

/// Long-cadence collateral PMRF (type code, offset per table row).
pub fn write_collateral_pmrf(dir: &Path, name: &str, entries: &[(i32, i32)]) {
    let kinds: Vec<i32> = entries.iter().map(|e| e.0).collect();
    let offsets: Vec<i32> = entries.iter().map(|e| e.1).collect();
    write_fits(
        &dir.join(name),
        &[],
        &[Table::for_channel(entries.len())
            .i32s("type", 1, &kinds)
            .i32s("offset", 1, &offsets)],
    );
}

/// Short-cadence collateral PMRF (type code, offset, target id per table row).
pub fn write_short_collateral_pmrf(dir: &Path, name: &str, entries: &[(i32, i32, i32)]) {
    let kinds: Vec<i32> = entries.iter().map(|e| e.0).collect();
    let offsets: Vec<i32> = entries.iter().map(|e| e.1).collect();
    let targets: Vec<i32> = entries.iter().map(|e| e.2).collect();
    write_fits(
        &dir.join(name),
        &[],
        &[Table::for_channel(entries.len())
            .i32s("type", 1, &kinds)
            .i32s("offset", 1, &offsets)
            .i32s("target_id", 1, &targets)],
    );
}

/// `crcc` snapshot: type code, offset, correction.
pub fn write_collateral_cosmic_rays(dir: &Path, cadence: i32, events: &[(i32, i32, f32)]) {
    let path = dir.join(format!("kplr{}_lcs-crcc.fits", stamp(cadence)));
    let kinds: Vec<i32> = events.iter().map(|e| e.0).collect();
    let offsets: Vec<i32> = events.iter().map(|e| e.1).collect();
    let deltas: Vec<f32> = events.iter().map(|e| e.2).collect();
    write_fits(
        &path,
        &[
            str_card("DATATYPE", "long cadence"),
            int_card("CADENNUM", i64::from(cadence)),
        ],
        &[Table::for_channel(events.len())
            .i32s("type", 1, &kinds)
            .i32s("offset", 1, &offsets)
            .f32s("delta", 1, &deltas)],
    );
}

/// `crct` snapshot: row, column, correction, target id, aperture id.
pub fn write_target_cosmic_rays(dir: &Path, cadence: i32, events: &[(i32, i32, f32, i32)]) {
    let path = dir.join(format!("kplr{}_lcs-crct.fits", stamp(cadence)));
    let rows: Vec<i32> = events.iter().map(|e| e.0).collect();
    let cols: Vec<i32> = events.iter().map(|e| e.1).collect();
    let deltas: Vec<f32> = events.iter().map(|e| e.2).collect();
    let ids: Vec<i32> = events.iter().map(|e| e.3).collect();
    write_fits(
        &path,
        &[
            str_card("DATATYPE", "long cadence"),
            int_card("CADENNUM", i64::from(cadence)),
        ],
        &[Table::for_channel(events.len())
            .i32s("row", 1, &rows)
            .i32s("column", 1, &cols)
            .f32s("delta", 1, &deltas)
            .i32s("target_id", 1, &ids)
            .i32s("aperture_id", 1, &vec![0; events.len()])],
    );
}

// ── Series exports ──────────────────────────────────────────────────────────

/// Per-cadence, per-pixel series contents. Vectors are row-major: one row per
/// cadence, one element per pixel.
pub struct SeriesRows {
    pub cadences: Vec<i32>,
    pub raw: Vec<i32>,
    pub flux: Vec<f32>,
    pub flux_err: Vec<f32>,
    pub cosmic_rays: Vec<f32>,
    pub quality: Vec<i32>,
}

fn series_primary(kepler_id: Option<i32>) -> Vec<String> {
    let mut cards = vec![
        int_card("MODULE", i64::from(MODULE)),
        int_card("OUTPUT", i64::from(OUTPUT)),
        str_card("OBSMODE", "long cadence"),
    ];
    if let Some(id) = kepler_id {
        cards.push(int_card("KEPLERID", i64::from(id)));
    }
    cards
}

/// ARP series file for the fixture channel.
pub fn write_arp_series(dir: &Path, pixels: &[(i32, i32)], rows: &SeriesRows) -> PathBuf {
    let first = rows.cadences[0];
    let path = dir.join(format!("kplr{:02}{}-{}_arp.fits", MODULE, OUTPUT, stamp(first)));
    let n = pixels.len();
    let times: Vec<f64> = rows.cadences.iter().map(|&c| mid_mjd(c)).collect();
    let data = Table::new(rows.cadences.len())
        .f64s("TIME", &times)
        .i32s("CADENCENO", 1, &rows.cadences)
        .i32s("RAW_CNTS", n, &rows.raw)
        .f32s("FLUX", n, &rows.flux)
        .f32s("FLUX_ERR", n, &rows.flux_err)
        .f32s("COSMIC_RAYS", n, &rows.cosmic_rays)
        .i32s("QUALITY", 1, &rows.quality);
    let cols: Vec<i32> = pixels.iter().map(|p| p.1).collect();
    let rws: Vec<i32> = pixels.iter().map(|p| p.0).collect();
    let list = Table::new(n)
        .i32s("COLUMN", 1, &cols)
        .i32s("ROW", 1, &rws);
    write_fits(&path, &series_primary(None), &[data, list]);
    path
}

/// Background series file for the fixture channel.
pub fn write_background_series(dir: &Path, pixels: &[(i32, i32)], rows: &SeriesRows) -> PathBuf {
    let first = rows.cadences[0];
    let path = dir.join(format!("kplr{:02}{}-{}_bkg.fits", MODULE, OUTPUT, stamp(first)));
    let n = pixels.len();
    let cadences = rows.cadences.len();
    let times: Vec<f64> = rows.cadences.iter().map(|&c| mid_mjd(c)).collect();
    let zeros = vec![0.0f32; cadences];
    let coeffs = vec![0.0f32; cadences * 4];
    let data = Table::new(cadences)
        .f64s("TIME", &times)
        .f32s("TIME_BKJD", 1, &zeros)
        .i32s("CADENCENO", 1, &rows.cadences)
        .i32s("RAW_CNTS", n, &rows.raw)
        .f32s("FLUX", n, &rows.flux)
        .f32s("FLUX_ERR", n, &rows.flux_err)
        .f32s("BKG_COEFF", 4, &coeffs)
        .f32s("BKG_COEFF_ERR", 4, &coeffs)
        .f32s("COSMIC_RAYS", n, &rows.cosmic_rays)
        .i32s("QUALITY", 1, &rows.quality)
        .f32s("COL_CORR", 1, &zeros)
        .f32s("ROW_CORR", 1, &zeros);
    let cols: Vec<i32> = pixels.iter().map(|p| p.1).collect();
    let rws: Vec<i32> = pixels.iter().map(|p| p.0).collect();
    let list = Table::new(n)
        .i32s("COLUMN", 1, &cols)
        .i32s("ROW", 1, &rws);
    write_fits(&path, &series_primary(None), &[data, list]);
    path
}

/// Long-cadence collateral series file; `entries` are (type code, offset).
pub fn write_collateral_series(dir: &Path, entries: &[(i32, i32)], rows: &SeriesRows) -> PathBuf {
    let first = rows.cadences[0];
    let path = dir.join(format!("kplr{:02}{}-{}_coll.fits", MODULE, OUTPUT, stamp(first)));
    let n = entries.len();
    let times: Vec<f64> = rows.cadences.iter().map(|&c| mid_mjd(c)).collect();
    let data = Table::new(rows.cadences.len())
        .f64s("TIME", &times)
        .i32s("CADENCENO", 1, &rows.cadences)
        .i32s("RAW_CNTS", n, &rows.raw)
        .f32s("FLUX", n, &rows.flux)
        .f32s("FLUX_ERR", n, &rows.flux_err)
        .f32s("COSMIC_RAYS", n, &rows.cosmic_rays);
    let kinds: Vec<i32> = entries.iter().map(|e| e.0).collect();
    let offsets: Vec<i32> = entries.iter().map(|e| e.1).collect();
    let list = Table::new(n)
        .i32s("TYPE", 1, &kinds)
        .i32s("OFFSET", 1, &offsets);
    write_fits(&path, &series_primary(None), &[data, list]);
    path
}

/// Target series file; `aperture` marks optimal-aperture pixels.
pub fn write_target_series(
    dir: &Path,
    kepler_id: i32,
    pixels: &[(i32, i32, bool)],
    rows: &SeriesRows,
    background: &[f32],
    background_err: &[f32],
) -> PathBuf {
    let first = rows.cadences[0];
    let path = dir.join(format!("kplr{:09}-{}_lpd-targ.fits", kepler_id, stamp(first)));
    let n = pixels.len();
    let times: Vec<f64> = rows.cadences.iter().map(|&c| mid_mjd(c)).collect();
    let corr = vec![0.0f32; rows.cadences.len()];
    let data = Table::new(rows.cadences.len())
        .f64s("TIME", &times)
        .f32s("TIMECORR", 1, &corr)
        .i32s("CADENCENO", 1, &rows.cadences)
        .i32s("RAW_CNTS", n, &rows.raw)
        .f32s("FLUX", n, &rows.flux)
        .f32s("FLUX_ERR", n, &rows.flux_err)
        .f32s("FLUX_BKG", n, background)
        .f32s("FLUX_BKG_ERR", n, background_err)
        .f32s("COSMIC_RAYS", n, &rows.cosmic_rays)
        .i32s("QUALITY", 1, &rows.quality);
    let rws: Vec<i32> = pixels.iter().map(|p| p.0).collect();
    let cols: Vec<i32> = pixels.iter().map(|p| p.1).collect();
    let aperture: Vec<bool> = pixels.iter().map(|p| p.2).collect();
    let list = Table::new(n)
        .i32s("ROW", 1, &rws)
        .i32s("COLUMN", 1, &cols)
        .bools("OPTIMAL", &aperture);
    write_fits(&path, &series_primary(Some(kepler_id)), &[data, list]);
    path
}

// ── Task artifacts ──────────────────────────────────────────────────────────

pub fn artifact_header(start: i32, end: i32) -> ArtifactHeader {
    artifact_header_of(CadenceType::Long, start, end)
}

pub fn artifact_header_of(cadence_type: CadenceType, start: i32, end: i32) -> ArtifactHeader {
    ArtifactHeader {
        module: MODULE,
        output: OUTPUT,
        cadence_type,
        start_cadence: start,
        end_cadence: end,
    }
}

pub fn raw(key: PixelKey, values: Vec<i32>, gaps: Vec<bool>) -> RawSeries {
    RawSeries { key, values, gaps }
}

pub fn calibrated(key: PixelKey, values: Vec<f32>, uncertainties: Vec<f32>, gaps: Vec<bool>) -> CalibratedSeries {
    CalibratedSeries {
        key,
        values,
        uncertainties,
        gaps,
    }
}

pub fn cosmic_ray(key: PixelKey, cadence: i32, delta: f32) -> CosmicRayEvent {
    CosmicRayEvent {
        key,
        mjd: mid_mjd(cadence),
        delta,
    }
}

/// Writes `<root>/<stage>-matlab-1-1/<stage>-<direction>-0.bin`.
pub fn save_artifact(root: &Path, artifact: &TaskArtifact) {
    save_task_artifact(root, 1, artifact);
}

/// Writes `<root>/<stage>-matlab-1-<task>/<stage>-<direction>-0.bin`.
pub fn save_task_artifact(root: &Path, task: u32, artifact: &TaskArtifact) {
    let (stage, direction) = artifact.stage();
    let dir = root.join(format!("{}-matlab-1-{}", stage.name(), task));
    std::fs::create_dir_all(&dir).unwrap();
    artifact
        .save_to_file(dir.join(format!("{}-{}-0.bin", stage.name(), direction.name())))
        .unwrap();
}

pub fn save_cal_inputs(root: &Path, inputs: CalInputs) {
    save_artifact(root, &TaskArtifact::CalInputs(inputs));
}

pub fn save_cal_outputs(root: &Path, outputs: CalOutputs) {
    save_artifact(root, &TaskArtifact::CalOutputs(outputs));
}

pub fn save_pa_outputs(root: &Path, outputs: PaOutputs) {
    save_artifact(root, &TaskArtifact::PaOutputs(outputs));
}

/// PA outputs with nothing but the header.
pub fn empty_pa_outputs(start: i32, end: i32) -> PaOutputs {
    PaOutputs {
        header: artifact_header(start, end),
        target_cosmic_rays: vec![],
        background_cosmic_rays: vec![],
        background: vec![],
        argabrightening_indices: vec![],
        zero_crossing_indices: vec![],
    }
}

/// Creates and returns `<base>/<name>`.
pub fn subdir(base: &Path, name: &str) -> PathBuf {
    let dir = base.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
