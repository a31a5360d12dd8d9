//! Simple implementation of the World Coordinate System standard.
//!
//! Only the linear (CD-matrix) part of a FITS WCS is modelled: it is all the DCR calculation
//! needs, namely the local pixel scale, the intrinsic rotation of the pixel grid against the
//! sky, and whether the x axis is mirrored.

use nalgebra::{Matrix2, Vector2};

use crate::Float;

/// Relevant data for WCS transformations from FITS headers.
#[derive(Clone, Debug, PartialEq)]
pub struct Wcs<F: Float> {
    /// Reference pixel.
    pub crpix: Vector2<F>,
    /// Coordinate value at `crpix`, in degrees.
    pub crval: Vector2<F>,
    /// Linear transformation matrix, in degrees per pixel.
    pub cd: Matrix2<F>,
}

impl<F: Float> Wcs<F> {
    /// Create a new instance.
    pub fn new(crpix: Vector2<F>, crval: Vector2<F>, cd: Matrix2<F>) -> Self {
        Self { crpix, crval, cd }
    }

    /// Build a CD matrix from a pixel scale in radians per pixel, an orientation of the pixel
    /// grid East from North, and an optional mirroring of the x axis.
    pub fn make_cd_matrix(scale: F, orientation: F, flip_x: bool) -> Matrix2<F> {
        let scale_deg = scale * F::from_f64(180.).unwrap() / F::pi();
        let x_mult = if flip_x {
            -F::from_f64(1.).unwrap()
        } else {
            F::from_f64(1.).unwrap()
        };
        Matrix2::new(
            orientation.cos() * scale_deg * x_mult,
            orientation.sin() * scale_deg,
            -orientation.sin() * scale_deg * x_mult,
            orientation.cos() * scale_deg,
        )
    }

    /// Local pixel scale, `sqrt(|det CD|)`, in radians per pixel.
    pub fn pixel_scale(&self) -> F {
        self.cd.determinant().abs().sqrt() * F::pi() / F::from_f64(180.).unwrap()
    }

    /// Whether the x axis is mirrored relative to the sky, i.e. the CD matrix flips handedness.
    pub fn is_flipped(&self) -> bool {
        self.cd.determinant() < F::zero()
    }

    /// Transforms from pixel to sky coordinate space.
    pub fn pixel_to_world(&self, pixel: Vector2<F>) -> Vector2<F> {
        let pixel = pixel + Vector2::new(F::from_f64(1.).unwrap(), F::from_f64(1.).unwrap());
        self.crval + self.cd * (pixel - self.crpix)
    }

    /// Transforms from sky coordinate to pixel space.
    pub fn world_to_pixel(&self, world_coordinate: Vector2<F>) -> Vector2<F> {
        let cd_inv = self.cd.try_inverse().unwrap();

        let pixel = self.crpix + cd_inv * (world_coordinate - self.crval);
        pixel - Vector2::new(F::from_f64(1.).unwrap(), F::from_f64(1.).unwrap())
    }
}

/// Test fixture mirroring a plain tangent-plane pointing.
#[cfg(test)]
pub(crate) fn dummy_wcs(
    rot_angle: f64,
    pixel_scale: f64,
    crval: Vector2<f64>,
    flip_x: bool,
) -> Wcs<f64> {
    let cd = Wcs::make_cd_matrix(pixel_scale, rot_angle, flip_x);
    Wcs::new(Vector2::new(20., 21.), crval, cd)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const ARCSEC: f64 = std::f64::consts::PI / (180. * 3600.);

    #[test]
    fn consistency_check() {
        let wcs = Wcs {
            crval: Vector2::new(2.711529441199E+01, -3.925398447545E+01),
            crpix: Vector2::new(5.065191000000E+02, 4.892484000000E+02),
            cd: Matrix2::new(
                1.672682044534E-04,
                1.996643749806E-06,
                -9.963899403011E-08,
                1.729743106508E-04,
            ),
        };

        let wc = wcs.pixel_to_world(Vector2::new(0., 0.));
        let px = wcs.world_to_pixel(wc);

        assert_abs_diff_eq!(px.x, 0., epsilon = 1e-10);
        assert_abs_diff_eq!(px.y, 0., epsilon = 1e-10);
    }

    #[test]
    fn pixel_scale_roundtrip() {
        for flip_x in [false, true] {
            let wcs = dummy_wcs(0.3, 0.2 * ARCSEC, Vector2::new(10., -40.), flip_x);
            assert_abs_diff_eq!(wcs.pixel_scale(), 0.2 * ARCSEC, epsilon = 1e-18);
            assert_eq!(wcs.is_flipped(), flip_x);
        }
    }

    #[test]
    fn cd_matrix_rotation_is_orthogonal() {
        let cd = Wcs::make_cd_matrix(0.2 * ARCSEC, 0.7, false);
        let scale_deg = (0.2 * ARCSEC).to_degrees();
        assert_abs_diff_eq!(cd.determinant(), scale_deg * scale_deg, epsilon = 1e-20);
    }
}
