//! # fitscheck
//!
//! Cross-validation of Kepler **FITS pixel exports** against the pipeline's
//! internal **task artifacts**.
//!
//! The science pipeline processes raw CCD pixels in stages (calibration,
//! photometric analysis, pre-search data conditioning) and writes each stage's
//! inputs and outputs as binary task artifacts. Separately, the archive export
//! writes the same pixels as FITS binary tables: per-cadence snapshot files for
//! original and calibrated pixels, and per-target or per-channel cadence series.
//! `fitscheck` reads both sides, converts them to a common key-addressed
//! representation and reports every value that disagrees.
//!
//! ## Features
//!
//! - **Snapshot checks**: original pixels in, calibrated pixels out, gap
//!   correspondence between the two
//! - **Series checks**: target, background, collateral and ARP pixels, with flux
//!   converted from per-cadence to per-second using the spacecraft configuration
//! - **Quality flags**: the packed per-cadence quality word of target series is
//!   reassembled from cadence times, cosmic rays and task outputs and compared
//! - **Gap conventions**: gapped cadences are checked against the sentinel each
//!   side uses instead of being compared value by value
//! - **Bounded reports**: totals over every comparison, with a capped list of
//!   mismatch lines
//!
//! ## Example
//!
//! ```no_run
//! use fitscheck::{
//!     CadenceTimes, CadenceType, Command, CrossValidationEngine, SpacecraftConfigHistory,
//!     ValidationOptions,
//! };
//!
//! let times = CadenceTimes::load_csv("data/cadence_times.csv", CadenceType::Long).unwrap();
//! let spacecraft = SpacecraftConfigHistory::load_csv("data/spacecraft.csv").unwrap();
//!
//! let options = ValidationOptions {
//!     command: Command::ArpPixels,
//!     module: Some(2),
//!     output: Some(1),
//!     start_cadence: 1000,
//!     end_cadence: 1100,
//!     output_dir: Some("exports/series".into()),
//!     task_root: Some("tasks".into()),
//!     ..Default::default()
//! };
//!
//! let engine = CrossValidationEngine::new(options, times, spacecraft).unwrap();
//! match engine.validate() {
//!     Ok(report) => println!("{} values agree", report.total_compared),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```
//!
//! ## Layout
//!
//! 1. [`fits`]: minimal FITS reader (headers and binary tables)
//! 2. [`export`]: export file discovery and pixel, cosmic-ray and quality extraction
//! 3. [`task`]: task artifact discovery, caching and extraction
//! 4. [`quality`]: quality-flag assembly
//! 5. [`validate`]: comparison, reporting and the cross-validation engine

pub mod cadence;
pub mod error;
pub mod export;
pub mod fits;
pub mod flux;
pub mod pixel;
pub mod quality;
pub mod task;
pub mod validate;

pub use cadence::{CadenceFlags, CadenceRecord, CadenceTimes};
pub use error::{Error, ErrorScope, Fetched, Result};
pub use flux::{FluxConverter, SpacecraftConfig, SpacecraftConfigHistory};
pub use pixel::{
    BackgroundValue, CadenceType, CollateralKey, CollateralType, CosmicRayMap, Pixel,
    PixelCategory, PixelKey, PixelValues, ValueTriple,
};
pub use quality::QualityFlagAssembler;
pub use validate::{
    Command, Comparison, CrossValidationEngine, ValidationOptions, ValidationReport, WorkUnit,
};
