#![warn(missing_docs)]

//! Rust port of the [DCR sky-model core of LSST `ip_diffim`](https://github.com/lsst/ip_diffim). \
//! Atmospheric differential chromatic refraction (DCR) shifts the apparent position of a source
//! by an amount that depends on wavelength, airmass, and sky-rotation geometry. To build an
//! accurate static-sky template from exposures taken at different pointings, a coaddition
//! pipeline has to predict that shift per wavelength sub-band ("subfilter"), resample images by
//! it, and iteratively fit a multi-subfilter model without letting chromatic sidelobes or
//! iteration noise run away. \
//! Since it is faithful to the original, most documentation on the chosen algorithms applies.
//!
//! ## Interface
//! The central struct of this library is [`DcrModel`](model::DcrModel): an ordered collection of
//! per-subfilter images (bluest first) sharing one mask plane and one bounding box. The external
//! fitting loop owns it and drives three in-place passes per iteration:
//! [`regularize_model_iter`](model::DcrModel::regularize_model_iter) per subfilter,
//! [`regularize_model_freq`](model::DcrModel::regularize_model_freq) across subfilters, and
//! [`condition_dcr_model`](model::DcrModel::condition_dcr_model) to blend the new generation
//! into the old one.
//!
//! Observation-space predictions are produced with the free functions
//! [`calculate_dcr`](dcr::calculate_dcr) (per-subfilter pixel shifts from the observation
//! geometry and bandpass) and [`apply_dcr`](dcr::apply_dcr) (sub-pixel image resampling by one
//! such shift, forward or inverse).
//!
//! Example:
//! ```rust,ignore
//! let shifts = calculate_dcr(&visit_info, &wcs, &band, 3)?;
//! let shifted = apply_dcr(model[0].view(), shifts[0], false);
//! ```
//!
//! ## Parameters
//! - `clamp_frequency`: Maximum allowed ratio between a subfilter pixel and the band-averaged
//!   reference image before the pixel is forced to the bound.
//! - `model_clamp_factor`: Same bound, but between consecutive fitting iterations of one
//!   subfilter.
//! - `regularization_width`: Minimum contiguous extent (in pixels) an outlier region must have
//!   to be treated as structured rather than noise. Smaller regions pass through unclamped.
//! - `gain`: Weight of the new model generation in the damped blend
//!   `(old + gain * new) / (1 + gain)`.

pub mod dcr;
pub mod error;
pub mod geometry;
pub mod model;
pub(crate) mod morphology;
pub(crate) mod ndarray_utils;
pub mod refraction;
pub mod wcs;

pub use dcr::{
    apply_dcr, calculate_dcr, calculate_image_parallactic_angle, BandpassInfo, DcrShift,
};
pub use error::DcrError;
pub use geometry::{Observatory, SpherePoint, VisitInfo, Weather};
pub use model::{Bbox, DcrModel, StatisticsControl};

/// A generic float trait such that the model and geometry code is generic over `f32`/`f64`.
///
/// This trait is automatically implemented for all types implementing the supertraits.
/// Particularly, this includes `f32` and `f64`.
/// [`num_traits::Float`] is not a supertrait as the need to specify the provider of the redundant
/// definitions of the basic math functions would clutter the code.
pub trait Float:
    Copy + Default + nalgebra::RealField + num_traits::FromPrimitive + num_traits::ToPrimitive
{
}

impl<F> Float for F where
    F: Copy + Default + nalgebra::RealField + num_traits::FromPrimitive + num_traits::ToPrimitive
{
}
