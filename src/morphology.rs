//! Binary morphology on boolean rasters.
//!
//! The regularizers flag outlier pixels and then open the flag mask with a diamond-shaped
//! structuring element: connected regions too small to contain the element are dropped, so
//! isolated noise pixels never get clamped while extended artifacts do. The conventions follow
//! `scipy.ndimage`: erosion treats everything outside the array as unset.

use ndarray::Array2;

/// Offsets of a diamond-shaped structuring element of the given radius.
///
/// Equivalent to dilating the 3x3 cross with itself `radius - 1` times
/// (`scipy.ndimage.iterate_structure`).
fn diamond_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let mut offsets = Vec::new();
    for di in -r..=r {
        for dj in -r..=r {
            if di.abs() + dj.abs() <= r {
                offsets.push((di, dj));
            }
        }
    }
    offsets
}

fn in_bounds(mask: &Array2<bool>, y: isize, x: isize) -> bool {
    let (height, width) = mask.dim();
    y >= 0 && y < height as isize && x >= 0 && x < width as isize
}

pub(crate) fn binary_erosion(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    let offsets = diamond_offsets(radius);
    Array2::from_shape_fn(mask.dim(), |(i, j)| {
        offsets.iter().all(|&(di, dj)| {
            let (y, x) = (i as isize + di, j as isize + dj);
            in_bounds(mask, y, x) && mask[(y as usize, x as usize)]
        })
    })
}

pub(crate) fn binary_dilation(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    let offsets = diamond_offsets(radius);
    Array2::from_shape_fn(mask.dim(), |(i, j)| {
        offsets.iter().any(|&(di, dj)| {
            let (y, x) = (i as isize + di, j as isize + dj);
            in_bounds(mask, y, x) && mask[(y as usize, x as usize)]
        })
    })
}

/// Erosion followed by dilation with the same diamond element.
///
/// Removes connected regions narrower than `radius + 1` pixels, leaves the rest in place.
/// A radius of zero is the identity.
pub(crate) fn binary_opening(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    if radius == 0 {
        return mask.clone();
    }
    binary_dilation(&binary_erosion(mask, radius), radius)
}
