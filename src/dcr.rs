//! Per-subfilter DCR shift computation and sub-pixel image resampling.
//!
//! The full photometric band is partitioned into equal wavelength sub-bands ("subfilters",
//! ordered bluest first). For one exposure, [`calculate_dcr`] turns the observation geometry and
//! bandpass into one pixel displacement per subfilter; [`apply_dcr`] resamples an image by such
//! a displacement, forward or inverse.

use itertools::Itertools;
use log::debug;
use ndarray::{Array2, ArrayView2};

use crate::error::DcrError;
use crate::geometry::VisitInfo;
use crate::refraction::differential_refraction;
use crate::wcs::Wcs;
use crate::Float;

/// Effective wavelength and throughput bounds of one photometric band, in nanometer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandpassInfo<F: Float> {
    /// Effective wavelength of the full band.
    pub lambda_eff: F,
    /// Minimum wavelength of non-negligible throughput.
    pub lambda_min: F,
    /// Maximum wavelength of non-negligible throughput.
    pub lambda_max: F,
}

/// Displacement of one subfilter relative to the effective wavelength, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DcrShift<F: Float> {
    /// Displacement along the row (y) axis.
    pub dy: F,
    /// Displacement along the column (x) axis.
    pub dx: F,
}

impl<F: Float> DcrShift<F> {
    /// Total displacement in pixels.
    pub fn amplitude(&self) -> F {
        self.dy.hypot(self.dx)
    }

    /// Signed component along the zenith direction, for an image rotation angle `rotation`.
    ///
    /// Positive values point toward zenith.
    pub fn zenith_component(&self, rotation: F) -> F {
        self.dx * rotation.sin() + self.dy * rotation.cos()
    }
}

/// The `(start, end)` wavelength pairs of `num_subfilters` equal sub-bands spanning the band.
pub fn wavelength_sub_bands<F: Float>(
    band: &BandpassInfo<F>,
    num_subfilters: usize,
) -> Vec<(F, F)> {
    let step = (band.lambda_max - band.lambda_min) / F::from_usize(num_subfilters).unwrap();
    (0..=num_subfilters)
        .map(|i| band.lambda_min + F::from_usize(i).unwrap() * step)
        .tuple_windows()
        .collect()
}

/// Total rotation angle between the local zenith direction and the image +y axis.
///
/// Equal to the parallactic angle plus the intrinsic rotation of the CD matrix; for a mirrored
/// x axis the sign of the CD rotation is reversed, so any fixed instrument rotation cancels out
/// of on-meridian observations either way.
pub fn calculate_image_parallactic_angle<F: Float>(visit_info: &VisitInfo<F>, wcs: &Wcs<F>) -> F {
    let par_angle = visit_info.boresight_par_angle();
    let cd = &wcs.cd;
    if wcs.is_flipped() {
        let cd_rot = F::atan2(cd[(0, 1)], -cd[(0, 0)]);
        par_angle - cd_rot
    } else {
        let cd_rot = F::atan2(cd[(0, 1)], cd[(0, 0)]);
        cd_rot - par_angle
    }
}

/// Calculate the shift in pixels of an exposure due to DCR, per subfilter.
///
/// For each sub-band, the refraction relative to the effective wavelength of the full band is
/// averaged over the sub-band edges, converted to pixels with the local pixel scale, and
/// decomposed along the image axes using the total rotation angle. Subfilter 0 is the bluest
/// and is shifted toward zenith for any positive airmass.
///
/// # Errors
/// [`DcrError::InvalidElevation`] for a boresight at or below the horizon,
/// [`DcrError::WavelengthOutOfRange`] if the band leaves the validity range of the refraction
/// model.
pub fn calculate_dcr<F: Float>(
    visit_info: &VisitInfo<F>,
    wcs: &Wcs<F>,
    band: &BandpassInfo<F>,
    num_subfilters: usize,
) -> Result<Vec<DcrShift<F>>, DcrError> {
    let elevation = visit_info.elevation();
    if elevation <= F::zero() {
        return Err(DcrError::InvalidElevation);
    }
    let rotation = calculate_image_parallactic_angle(visit_info, wcs);
    let pixel_scale = wcs.pixel_scale();
    debug!("computing {num_subfilters} subfilter shifts");

    let two = F::from_f64(2.).unwrap();
    let mut dcr_shift = Vec::with_capacity(num_subfilters);
    for (wl_start, wl_end) in wavelength_sub_bands(band, num_subfilters) {
        // The amplitude can be negative: it is relative to the effective wavelength, which sits
        // inside the band.
        let amp_start = differential_refraction(
            wl_start,
            band.lambda_eff,
            elevation,
            &visit_info.observatory,
            &visit_info.weather,
        )?;
        let amp_end = differential_refraction(
            wl_end,
            band.lambda_eff,
            elevation,
            &visit_info.observatory,
            &visit_info.weather,
        )?;
        let shift_pixels = (amp_start + amp_end) / two / pixel_scale;
        dcr_shift.push(DcrShift {
            dy: shift_pixels * rotation.cos(),
            dx: shift_pixels * rotation.sin(),
        });
    }
    Ok(dcr_shift)
}

/// Weights of the Keys cubic convolution kernel (a = -1/2) for a fractional offset `t` in
/// `[0, 1)`, for the four taps at distances `1 + t`, `t`, `1 - t`, `2 - t`.
///
/// The weights sum to one for any `t`, so resampling conserves flux away from the array edges,
/// and they reduce to `(0, 1, 0, 0)` exactly for `t = 0`.
fn cubic_kernel<F: Float>(t: F) -> [F; 4] {
    let a = F::from_f64(-0.5).unwrap();
    let inner = |s: F| (a + F::from_f64(2.).unwrap()) * s.powi(3)
        - (a + F::from_f64(3.).unwrap()) * s.powi(2)
        + F::one();
    let outer = |s: F| {
        a * (s.powi(3) - F::from_f64(5.).unwrap() * s.powi(2) + F::from_f64(8.).unwrap() * s
            - F::from_f64(4.).unwrap())
    };
    [
        outer(F::one() + t),
        inner(t),
        inner(F::one() - t),
        outer(F::from_f64(2.).unwrap() - t),
    ]
}

/// Shift an image by a DCR displacement using separable cubic convolution.
///
/// `use_inverse` applies the negated displacement. A point source at `(y, x)` lands exactly at
/// `(y + dy, x + dx)`; content shifted in from outside the array is zero.
pub fn apply_dcr<F: Float>(
    image: ArrayView2<F>,
    shift: DcrShift<F>,
    use_inverse: bool,
) -> Array2<F> {
    let (dy, dx) = if use_inverse {
        (-shift.dy, -shift.dx)
    } else {
        (shift.dy, shift.dx)
    };
    let (height, width) = image.dim();
    let mut out = Array2::zeros((height, width));

    // Output pixel (i, j) samples the input at (i - dy, j - dx); the fractional part of the
    // sampling position is the same for every pixel.
    let y_base = (-dy).floor();
    let x_base = (-dx).floor();
    let ty = -dy - y_base;
    let tx = -dx - x_base;
    let y_base = y_base.to_isize().unwrap();
    let x_base = x_base.to_isize().unwrap();
    let weights_y = cubic_kernel(ty);
    let weights_x = cubic_kernel(tx);

    for i in 0..height {
        for j in 0..width {
            let mut acc = F::zero();
            for (m, &weight_y) in weights_y.iter().enumerate() {
                if weight_y == F::zero() {
                    continue;
                }
                let src_i = i as isize + y_base + m as isize - 1;
                if src_i < 0 || src_i >= height as isize {
                    continue;
                }
                for (n, &weight_x) in weights_x.iter().enumerate() {
                    if weight_x == F::zero() {
                        continue;
                    }
                    let src_j = j as isize + x_base + n as isize - 1;
                    if src_j < 0 || src_j >= width as isize {
                        continue;
                    }
                    acc += weight_y * weight_x * image[(src_i as usize, src_j as usize)];
                }
            }
            out[(i, j)] = acc;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::geometry::test_site;
    use crate::wcs::dummy_wcs;

    const ARCSEC: f64 = std::f64::consts::PI / (180. * 3600.);

    /// LSST g band.
    fn g_band() -> BandpassInfo<f64> {
        BandpassInfo {
            lambda_eff: 476.31,
            lambda_min: 405.,
            lambda_max: 552.,
        }
    }

    fn crval(visit_info: &VisitInfo<f64>) -> Vector2<f64> {
        Vector2::new(
            visit_info.boresight_ra_dec.longitude.to_degrees(),
            visit_info.boresight_ra_dec.latitude.to_degrees(),
        )
    }

    #[test]
    fn dcr_calculation_matches_reference_values() {
        let visit_info = test_site::visit_info(30_f64.to_radians(), 65_f64.to_radians());
        let wcs = dummy_wcs(0., 0.2 * ARCSEC, crval(&visit_info), true);
        let dcr_shift = calculate_dcr(&visit_info, &wcs, &g_band(), 3).unwrap();

        // Precomputed (dy, dx) values for this geometry.
        let ref_shift: [(f64, f64); 3] = [
            (-0.5363165801, -0.3103316379),
            (0.0018872141, 0.0010920085),
            (0.3886342068, 0.2248774220),
        ];
        for (old, new) in ref_shift.iter().zip(&dcr_shift) {
            assert_abs_diff_eq!(old.0, new.dy, epsilon = 1e-8 + 1e-6 * old.0.abs());
            assert_abs_diff_eq!(old.1, new.dx, epsilon = 1e-8 + 1e-6 * old.1.abs());
        }

        // Shifts precomputed by the LSST Python pipeline for the same geometry; the port agrees
        // with them to about one part in 1e4.
        let lsst_shift: [(f64, f64); 3] = [
            (-0.5363512808, -0.3103517169),
            (0.001887293861, 0.001092054612),
            (0.3886592703, 0.2248919247),
        ];
        for (old, new) in lsst_shift.iter().zip(&dcr_shift) {
            assert_abs_diff_eq!(old.0, new.dy, epsilon = 1e-8 + 1e-4 * old.0.abs());
            assert_abs_diff_eq!(old.1, new.dx, epsilon = 1e-8 + 1e-4 * old.1.abs());
        }
    }

    #[test]
    fn bluest_subfilter_has_the_largest_amplitude() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            let rot_angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let azimuth = rng.gen_range(0.0..std::f64::consts::TAU);
            let elevation = (45. + rng.gen_range(0.0..40.0_f64)).to_radians();
            let visit_info = test_site::visit_info(azimuth, elevation);
            let wcs = dummy_wcs(rot_angle, 0.2 * ARCSEC, crval(&visit_info), true);

            let dcr_shift = calculate_dcr(&visit_info, &wcs, &g_band(), 3).unwrap();
            let rotation = calculate_image_parallactic_angle(&visit_info, &wcs);
            let amp: Vec<f64> = dcr_shift
                .iter()
                .map(|shift| shift.zenith_component(rotation))
                .collect();
            // The blue subfilter is shifted towards zenith, the red one away from it.
            assert!(amp[0] > 0.);
            assert!(amp[2] < 0.);
            assert!(amp[0].abs() > amp[2].abs());
        }
    }

    #[test]
    fn below_horizon_geometry_is_rejected() {
        let mut visit_info = test_site::visit_info(0., 65_f64.to_radians());
        visit_info.boresight_az_alt.latitude = -0.1;
        let wcs = dummy_wcs(0., 0.2 * ARCSEC, crval(&visit_info), true);
        assert_eq!(
            calculate_dcr(&visit_info, &wcs, &g_band(), 3),
            Err(DcrError::InvalidElevation)
        );
    }

    #[test]
    fn rotation_angle_matches_reference_value() {
        let visit_info = test_site::visit_info(130_f64.to_radians(), 70_f64.to_radians());
        let wcs = dummy_wcs(0., 0.2 * ARCSEC, crval(&visit_info), true);
        let rot_angle = calculate_image_parallactic_angle(&visit_info, &wcs);
        assert_abs_diff_eq!(rot_angle, -0.9344289857053072, epsilon = 1e-6);
    }

    #[test]
    fn south_pointing_rotation_is_minus_cd_rotation() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            // Any arbitrary instrument rotation must fall out of the calculation.
            let cd_rot_angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let elevation = (45. + rng.gen_range(0.0..40.0_f64)).to_radians();
            let visit_info = test_site::visit_info(std::f64::consts::PI, elevation);
            let wcs = dummy_wcs(cd_rot_angle, 0.2 * ARCSEC, crval(&visit_info), true);
            let rot_angle = calculate_image_parallactic_angle(&visit_info, &wcs);
            assert_abs_diff_eq!(
                angle_difference(rot_angle, -cd_rot_angle),
                0.,
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn flipping_the_wcs_negates_the_rotation() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let cd_rot_angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let elevation = (45. + rng.gen_range(0.0..40.0_f64)).to_radians();
            let visit_info = test_site::visit_info(std::f64::consts::PI, elevation);
            for flip in [false, true] {
                let wcs = dummy_wcs(cd_rot_angle, 0.2 * ARCSEC, crval(&visit_info), flip);
                let mut rot_angle = calculate_image_parallactic_angle(&visit_info, &wcs);
                if flip {
                    rot_angle = -rot_angle;
                }
                assert_abs_diff_eq!(
                    angle_difference(rot_angle, cd_rot_angle),
                    0.,
                    epsilon = 1e-6
                );
            }
        }
    }

    fn angle_difference(a: f64, b: f64) -> f64 {
        let diff = (a - b) % std::f64::consts::TAU;
        if diff > std::f64::consts::PI {
            diff - std::f64::consts::TAU
        } else if diff < -std::f64::consts::PI {
            diff + std::f64::consts::TAU
        } else {
            diff
        }
    }

    #[test]
    fn wavelength_sub_bands_partition_the_band() {
        let bands = wavelength_sub_bands(&g_band(), 3);
        assert_eq!(bands.len(), 3);
        assert_abs_diff_eq!(bands[0].0, 405., epsilon = 1e-9);
        assert_abs_diff_eq!(bands[2].1, 552., epsilon = 1e-9);
        for window in bands.windows(2) {
            assert_abs_diff_eq!(window[0].1, window[1].0, epsilon = 1e-9);
        }
    }

    #[test]
    fn integer_shifts_move_an_impulse_exactly() {
        let (height, width) = (42, 40);
        let (y0, x0) = (27, 13);
        let mut image = Array2::<f64>::zeros((height, width));
        image[(y0, x0)] = 1.;

        for dy in [-2_isize, -1, 0, 1, 2] {
            for dx in [-2_isize, -1, 0, 1, 2] {
                let shift = DcrShift {
                    dy: dy as f64,
                    dx: dx as f64,
                };
                let shifted = apply_dcr(image.view(), shift, false);
                let mut reference = Array2::<f64>::zeros((height, width));
                reference[((y0 as isize + dy) as usize, (x0 as isize + dx) as usize)] = 1.;
                assert_abs_diff_eq!(shifted, reference, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn inverse_negates_the_shift() {
        let mut image = Array2::<f64>::zeros((20, 20));
        image[(10, 10)] = 1.;
        let shift = DcrShift { dy: 2., dx: -1. };
        let forward = apply_dcr(image.view(), shift, false);
        let inverse = apply_dcr(image.view(), shift, true);
        assert_abs_diff_eq!(forward[(12, 9)], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(inverse[(8, 11)], 1., epsilon = 1e-12);
    }

    #[test]
    fn fractional_shifts_conserve_flux() {
        let mut image = Array2::<f64>::zeros((21, 21));
        image[(10, 10)] = 1.;
        for shift in [
            DcrShift { dy: 0.5, dx: 0.25 },
            DcrShift { dy: -1.3, dx: 0.7 },
            DcrShift { dy: 0.1, dx: -2.6 },
        ] {
            let shifted = apply_dcr(image.view(), shift, false);
            assert_abs_diff_eq!(shifted.sum(), 1., epsilon = 1e-9);
        }
    }
}
