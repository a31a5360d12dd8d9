//! Error type of the DCR model core.
//!
//! All failures here are structural (bad shapes, bad geometry); none of the per-pixel clamp or
//! blend operations has a fatal path. Errors are surfaced immediately to the caller and never
//! retried internally.

use thiserror::Error;

/// Errors produced by the DCR model core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DcrError {
    /// The boresight elevation is at or below the horizon, so the airmass is undefined.
    #[error("elevation at or below the horizon has no defined airmass")]
    InvalidElevation,
    /// The refraction model of Stone (1996) is only fit for the optical and near infrared.
    #[error("refraction calculation is valid for wavelengths between 230.2 and 2058.6 nm")]
    WavelengthOutOfRange,
    /// A subfilter image does not match the dimensions of the model planes.
    #[error("image dimensions {actual:?} do not match the model dimensions {expected:?}")]
    ShapeMismatch {
        /// Dimensions `(rows, columns)` of the model planes.
        expected: (usize, usize),
        /// Dimensions `(rows, columns)` of the offending image.
        actual: (usize, usize),
    },
    /// The number of new model planes differs from the number of subfilters.
    #[error("expected {expected} model planes, got {actual}")]
    WrongPlaneCount {
        /// Number of subfilters of the model.
        expected: usize,
        /// Number of planes passed by the caller.
        actual: usize,
    },
    /// A model must hold at least one subfilter plane.
    #[error("a DCR model requires at least one subfilter plane")]
    EmptyModel,
    /// A requested bounding box reaches outside the model's bounding box.
    #[error("bounding box not contained in the model bounding box")]
    BboxOutOfBounds,
    /// A subfilter index (possibly negative) resolved outside the model.
    #[error("subfilter index {index} out of range for {len} planes")]
    SubfilterOutOfRange {
        /// The index as given by the caller.
        index: isize,
        /// Number of subfilter planes.
        len: usize,
    },
}
