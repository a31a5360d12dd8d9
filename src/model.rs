//! The multi-subfilter chromatic sky model and its regularization machinery.
//!
//! A [`DcrModel`] holds one image per subfilter (bluest first), a shared mask plane, and a
//! shared bounding box. The external fitting loop mutates candidate model generations in place
//! through the two regularizers and the conditioner; the stored planes only change through
//! explicit assignment. All operations are synchronous, single-threaded array transforms over a
//! bounded region.

use std::ops::{Index, Range};

use itertools::izip;
use log::debug;
use ndarray::{s, Array2, ArrayView2, ArrayViewMut2, Zip};

use crate::error::DcrError;
use crate::morphology::binary_opening;
use crate::ndarray_utils::{masked_std, sigma_clipped_mean};
use crate::Float;

/// Mask plane bits shared by all subfilter planes.
pub mod mask_plane {
    /// Pixel is part of a detected source footprint.
    pub const DETECTED: u32 = 1 << 0;
    /// Pixel was rejected by sigma clipping during coaddition.
    pub const CLIPPED: u32 = 1 << 1;
}

/// Integer bounding box in the parent (exposure) coordinate system.
///
/// Model arrays are indexed `[row, column]` relative to the lower corner of their own box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bbox {
    /// Column of the lower corner.
    pub x0: i64,
    /// Row of the lower corner.
    pub y0: i64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl Bbox {
    /// Create a new box from its lower corner and dimensions.
    pub fn new(x0: i64, y0: i64, width: usize, height: usize) -> Self {
        Self {
            x0,
            y0,
            width,
            height,
        }
    }

    /// Dimensions as `(rows, columns)`, the shape of an image over this box.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Whether `other` lies entirely within this box.
    pub fn contains(&self, other: &Bbox) -> bool {
        other.x0 >= self.x0
            && other.y0 >= self.y0
            && other.x0 + other.width as i64 <= self.x0 + self.width as i64
            && other.y0 + other.height as i64 <= self.y0 + self.height as i64
    }

    /// Grow the box by `amount` pixels on every side; negative amounts shrink it.
    ///
    /// The dimensions saturate at zero.
    pub fn grow(&self, amount: i64) -> Bbox {
        let width = (self.width as i64 + 2 * amount).max(0) as usize;
        let height = (self.height as i64 + 2 * amount).max(0) as usize;
        Bbox {
            x0: self.x0 - amount,
            y0: self.y0 - amount,
            width,
            height,
        }
    }

    /// Index ranges of this box within an array laid out over `parent`.
    /// Only valid after a `contains` check.
    fn local_slice(&self, parent: &Bbox) -> (Range<usize>, Range<usize>) {
        let y = (self.y0 - parent.y0) as usize;
        let x = (self.x0 - parent.x0) as usize;
        (y..y + self.height, x..x + self.width)
    }
}

/// Configuration of the clipped statistics used for the reference image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatisticsControl<F: Float> {
    /// Clipping threshold in standard deviations.
    pub num_sigma_clip: F,
    /// Number of clipping iterations.
    pub num_iter: usize,
    /// Drop `NaN` pixels instead of letting them poison the statistics.
    pub nan_safe: bool,
    /// Weight the inputs; all subfilters carry equal weight here, so this is a no-op kept for
    /// interface compatibility with the wider coaddition configuration.
    pub weighted: bool,
    /// Derive errors from the input variance plane rather than the sample scatter. No variance
    /// planes exist in this core; kept for interface compatibility.
    pub calc_error_from_input_variance: bool,
}

impl<F: Float> Default for StatisticsControl<F> {
    fn default() -> Self {
        Self {
            num_sigma_clip: F::from_f64(3.).unwrap(),
            num_iter: 3,
            nan_safe: true,
            weighted: false,
            calc_error_from_input_variance: false,
        }
    }
}

/// An ordered collection of per-subfilter images sharing one mask plane and one bounding box.
///
/// Subfilter 0 is the bluest. Indexing accepts negative values counting from the end, like the
/// sequence protocol of the Python original, and iteration runs bluest to reddest.
#[derive(Clone, Debug)]
pub struct DcrModel<F: Float> {
    model_images: Vec<Array2<F>>,
    mask: Array2<u32>,
    bbox: Bbox,
}

impl<F: Float> DcrModel<F> {
    /// Create a model from one image per subfilter, ordered bluest first.
    ///
    /// All images must share the dimensions of `bbox`; `mask` defaults to all-clear.
    pub fn new(
        model_images: Vec<Array2<F>>,
        mask: Option<Array2<u32>>,
        bbox: Bbox,
    ) -> Result<Self, DcrError> {
        let expected = bbox.dimensions();
        if model_images.is_empty() {
            return Err(DcrError::EmptyModel);
        }
        for image in &model_images {
            if image.dim() != expected {
                return Err(DcrError::ShapeMismatch {
                    expected,
                    actual: image.dim(),
                });
            }
        }
        let mask = match mask {
            Some(mask) if mask.dim() != expected => {
                return Err(DcrError::ShapeMismatch {
                    expected,
                    actual: mask.dim(),
                });
            }
            Some(mask) => mask,
            None => Array2::zeros(expected),
        };
        Ok(Self {
            model_images,
            mask,
            bbox,
        })
    }

    /// Number of subfilters, fixed at construction.
    pub fn len(&self) -> usize {
        self.model_images.len()
    }

    /// Always `false`; construction rejects empty models.
    pub fn is_empty(&self) -> bool {
        self.model_images.is_empty()
    }

    /// The bounding box shared by all subfilter planes.
    pub fn bbox(&self) -> Bbox {
        self.bbox
    }

    /// The mask plane shared by all subfilter planes.
    pub fn mask(&self) -> ArrayView2<'_, u32> {
        self.mask.view()
    }

    /// Iterate over the subfilter planes, bluest to reddest.
    pub fn iter(&self) -> std::slice::Iter<'_, Array2<F>> {
        self.model_images.iter()
    }

    fn resolve_index(&self, subfilter: isize) -> Result<usize, DcrError> {
        let len = self.model_images.len() as isize;
        let resolved = if subfilter < 0 {
            subfilter + len
        } else {
            subfilter
        };
        if (0..len).contains(&resolved) {
            Ok(resolved as usize)
        } else {
            Err(DcrError::SubfilterOutOfRange {
                index: subfilter,
                len: self.model_images.len(),
            })
        }
    }

    /// The plane for `subfilter`; negative indices count from the reddest end.
    pub fn get(&self, subfilter: isize) -> Option<&Array2<F>> {
        self.resolve_index(subfilter)
            .ok()
            .map(|index| &self.model_images[index])
    }

    /// Replace the plane for `subfilter` (negative indices allowed).
    ///
    /// The image must match the model dimensions.
    pub fn set_image(&mut self, subfilter: isize, image: Array2<F>) -> Result<(), DcrError> {
        let index = self.resolve_index(subfilter)?;
        if image.dim() != self.bbox.dimensions() {
            return Err(DcrError::ShapeMismatch {
                expected: self.bbox.dimensions(),
                actual: image.dim(),
            });
        }
        self.model_images[index] = image;
        Ok(())
    }

    /// The band-averaged template over `bbox`: a per-pixel sigma-clipped mean of all subfilter
    /// planes, per `stats_ctrl`.
    pub fn reference_image(
        &self,
        bbox: &Bbox,
        stats_ctrl: &StatisticsControl<F>,
    ) -> Result<Array2<F>, DcrError> {
        let (rows, cols) = self.region(bbox)?;
        let views: Vec<ArrayView2<F>> = self
            .model_images
            .iter()
            .map(|image| image.slice(s![rows.clone(), cols.clone()]))
            .collect();

        let mut out = Array2::zeros(bbox.dimensions());
        let mut values = Vec::with_capacity(views.len());
        for ((i, j), pixel) in out.indexed_iter_mut() {
            values.clear();
            values.extend(views.iter().map(|view| view[(i, j)]));
            *pixel = sigma_clipped_mean(
                &values,
                stats_ctrl.num_sigma_clip,
                stats_ctrl.num_iter,
                stats_ctrl.nan_safe,
            );
        }
        Ok(out)
    }

    /// Background noise level of `image`: the standard deviation of its non-detected pixels,
    /// measured `buffer_size` pixels in from the edge of `bbox` to stay clear of model edge
    /// effects. The fitting loop compares per-iteration residuals against this cutoff.
    pub fn calculate_noise_cutoff(
        &self,
        image: &Array2<F>,
        stats_ctrl: &StatisticsControl<F>,
        buffer_size: usize,
        bbox: &Bbox,
    ) -> Result<F, DcrError> {
        self.check_plane_shape(image)?;
        let shrunk = bbox.grow(-(buffer_size as i64));
        let (rows, cols) = self.region(&shrunk)?;
        Ok(masked_std(
            image.slice(s![rows.clone(), cols.clone()]),
            self.mask.slice(s![rows, cols]),
            mask_plane::DETECTED,
            stats_ctrl.nan_safe,
        ))
    }

    /// Restrict large variations between the subfilter planes of a candidate model generation.
    ///
    /// Each plane of `new_models` is clamped towards the band-averaged reference image: pixels
    /// above `reference * clamp_frequency` or below `reference / clamp_frequency` are forced to
    /// the bound, but only where the outlier region is at least `regularization_width` pixels
    /// across. Isolated noise-like outliers and `NaN` pixels pass through untouched. The model's
    /// own stored planes are not modified.
    pub fn regularize_model_freq(
        &self,
        new_models: &mut [Array2<F>],
        bbox: &Bbox,
        stats_ctrl: &StatisticsControl<F>,
        clamp_frequency: F,
        regularization_width: usize,
    ) -> Result<(), DcrError> {
        self.check_plane_count(new_models)?;
        let template = self.reference_image(bbox, stats_ctrl)?;
        let high_threshold = template.mapv(|t| t * clamp_frequency);
        let low_threshold = template.mapv(|t| t / clamp_frequency);
        debug!(
            "frequency regularization of {} planes over {:?}",
            new_models.len(),
            bbox.dimensions()
        );

        for model in new_models.iter_mut() {
            self.check_plane_shape(model)?;
            let (rows, cols) = self.region(bbox)?;
            let mut region = model.slice_mut(s![rows, cols]);
            apply_image_thresholds(
                &mut region,
                &high_threshold,
                &low_threshold,
                regularization_width,
            );
        }
        Ok(())
    }

    /// Restrict large changes of one subfilter plane between fitting iterations.
    ///
    /// Same clamp-with-opening algorithm as [`regularize_model_freq`](Self::regularize_model_freq),
    /// but the baseline is the stored plane for `subfilter` (the previous accepted iteration) and
    /// the bounds are `old * model_clamp_factor` and `old / model_clamp_factor`. Mutates
    /// `new_image` in place.
    pub fn regularize_model_iter(
        &self,
        subfilter: isize,
        new_image: &mut Array2<F>,
        bbox: &Bbox,
        model_clamp_factor: F,
        regularization_width: usize,
    ) -> Result<(), DcrError> {
        let index = self.resolve_index(subfilter)?;
        self.check_plane_shape(new_image)?;
        let (rows, cols) = self.region(bbox)?;
        let old = self.model_images[index].slice(s![rows.clone(), cols.clone()]);
        let high_threshold = old.map(|&o| o * model_clamp_factor);
        let low_threshold = old.map(|&o| o / model_clamp_factor);

        let mut region = new_image.slice_mut(s![rows, cols]);
        apply_image_thresholds(
            &mut region,
            &high_threshold,
            &low_threshold,
            regularization_width,
        );
        Ok(())
    }

    /// Blend a candidate model generation into the stored one with a damped update.
    ///
    /// Each plane of `new_models` is replaced by `(old + gain * new) / (1 + gain)` over `bbox`.
    /// A converged plane (`new == old`) is unchanged for any gain; the stored planes are only
    /// updated by the caller once it accepts the conditioned result.
    pub fn condition_dcr_model(
        &self,
        new_models: &mut [Array2<F>],
        bbox: &Bbox,
        gain: F,
    ) -> Result<(), DcrError> {
        self.check_plane_count(new_models)?;
        let norm = F::one() + gain;
        for (old, new) in izip!(&self.model_images, new_models.iter_mut()) {
            self.check_plane_shape(new)?;
            let (rows, cols) = self.region(bbox)?;
            let old_region = old.slice(s![rows.clone(), cols.clone()]);
            let mut new_region = new.slice_mut(s![rows, cols]);
            Zip::from(&mut new_region)
                .and(&old_region)
                .for_each(|new, &old| *new = (old + gain * *new) / norm);
        }
        Ok(())
    }

    fn check_plane_count(&self, new_models: &[Array2<F>]) -> Result<(), DcrError> {
        if new_models.len() != self.model_images.len() {
            return Err(DcrError::WrongPlaneCount {
                expected: self.model_images.len(),
                actual: new_models.len(),
            });
        }
        Ok(())
    }

    fn check_plane_shape(&self, image: &Array2<F>) -> Result<(), DcrError> {
        if image.dim() != self.bbox.dimensions() {
            return Err(DcrError::ShapeMismatch {
                expected: self.bbox.dimensions(),
                actual: image.dim(),
            });
        }
        Ok(())
    }

    fn region(&self, bbox: &Bbox) -> Result<(Range<usize>, Range<usize>), DcrError> {
        if !self.bbox.contains(bbox) {
            return Err(DcrError::BboxOutOfBounds);
        }
        Ok(bbox.local_slice(&self.bbox))
    }
}

impl<F: Float> Index<isize> for DcrModel<F> {
    type Output = Array2<F>;

    fn index(&self, subfilter: isize) -> &Self::Output {
        self.get(subfilter).expect("subfilter index out of range")
    }
}

impl<'a, F: Float> IntoIterator for &'a DcrModel<F> {
    type Item = &'a Array2<F>;
    type IntoIter = std::slice::Iter<'a, Array2<F>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Clamp pixels beyond the thresholds, ignoring outlier regions too small to contain the
/// diamond structuring element of radius `regularization_width`.
///
/// `NaN` pixels compare false against both thresholds and are never clamped.
fn apply_image_thresholds<F: Float>(
    image: &mut ArrayViewMut2<F>,
    high_threshold: &Array2<F>,
    low_threshold: &Array2<F>,
    regularization_width: usize,
) {
    let high_pixels = Zip::from(&*image)
        .and(high_threshold)
        .map_collect(|&pixel, &threshold| pixel > threshold);
    let high_pixels = binary_opening(&high_pixels, regularization_width);
    Zip::from(&mut *image)
        .and(&high_pixels)
        .and(high_threshold)
        .for_each(|pixel, &flagged, &threshold| {
            if flagged {
                *pixel = threshold;
            }
        });

    let low_pixels = Zip::from(&*image)
        .and(low_threshold)
        .map_collect(|&pixel, &threshold| pixel < threshold);
    let low_pixels = binary_opening(&low_pixels, regularization_width);
    Zip::from(&mut *image)
        .and(&low_pixels)
        .and(low_threshold)
        .for_each(|pixel, &flagged, &threshold| {
            if flagged {
                *pixel = threshold;
            }
        });
}
