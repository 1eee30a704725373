//! Cross-validation of task artifacts against FITS exports.
//!
//! [`ValidationOptions`] describe a run, [`CrossValidationEngine`] executes it
//! and [`ValidationReport`] accumulates the outcome.

pub mod compare;
pub mod engine;
pub mod options;
pub mod report;

pub use engine::CrossValidationEngine;
pub use options::{Command, ValidationOptions, WorkUnit};
pub use report::{Comparison, ValidationReport};
