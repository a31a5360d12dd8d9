//! Atmospheric refraction after Stone (1996), ported from `lsst.afw.coord.refraction`.
//!
//! The refraction angle is expanded as `n * tan(Z) + n' * tan^3(Z)` in the zenith angle `Z`,
//! with the refractivity of moist air split into dry-air and water-vapour density factors.
//! Wavelengths are in nanometer, angles in radians. The empirical fit is valid between
//! 230.2 nm and 2058.6 nm.

use crate::error::DcrError;
use crate::geometry::{Observatory, Weather};
use crate::Float;

/// `delta_n` works in refractivity units of `(n - 1) * 1e8`.
const DELTA_REFRACT_SCALE: f64 = 1.0e8;

/// Shorthand for lifting an `f64` constant into the generic scalar type.
fn c<F: Float>(value: f64) -> F {
    F::from_f64(value).unwrap()
}

/// Refraction angle in radians for light of `wavelength` (nm) arriving at `elevation` (rad).
pub fn refraction<F: Float>(
    wavelength: F,
    elevation: F,
    observatory: &Observatory<F>,
    weather: &Weather<F>,
) -> Result<F, DcrError> {
    if wavelength < c(230.2) || wavelength > c(2058.6) {
        return Err(DcrError::WavelengthOutOfRange);
    }
    if elevation <= F::zero() {
        return Err(DcrError::InvalidElevation);
    }
    let reduced_n = delta_n(wavelength, weather) / c(DELTA_REFRACT_SCALE);
    let temperature_kelvin = weather.temperature + c(273.15);
    let atmos_scaleheight_ratio = c::<F>(4.5908e-6) * temperature_kelvin;

    // Local gravity relative to the equator, corrected for the oblate Earth.
    // Equation 10 of Stone 1996.
    let latitude = observatory.latitude;
    let relative_gravity = F::one() + c::<F>(0.005302) * latitude.sin().powi(2)
        - c::<F>(0.00000583) * (c::<F>(2.) * latitude).sin().powi(2)
        - c::<F>(0.000000315) * observatory.elevation;

    let tan_z = (F::frac_pi_2() - elevation).tan();
    let atmos_term_1 = reduced_n * relative_gravity * (F::one() - atmos_scaleheight_ratio);
    // The cubic term carries a negative sign: it trims the linear tan(Z) growth at low elevation.
    let atmos_term_2 =
        -(reduced_n * relative_gravity * (atmos_scaleheight_ratio - reduced_n / c(2.)));
    Ok(atmos_term_1 * tan_z + atmos_term_2 * tan_z.powi(3))
}

/// Refraction of light of `wavelength` relative to `wavelength_ref`, in radians.
///
/// Positive for wavelengths bluer than the reference: blue light is bent further toward zenith.
pub fn differential_refraction<F: Float>(
    wavelength: F,
    wavelength_ref: F,
    elevation: F,
    observatory: &Observatory<F>,
    weather: &Weather<F>,
) -> Result<F, DcrError> {
    let refraction_start = refraction(wavelength, elevation, observatory, weather)?;
    let refraction_end = refraction(wavelength_ref, elevation, observatory, weather)?;
    Ok(refraction_start - refraction_end)
}

/// Differential refractive index of air, `(n - 1) * 1e8`.
fn delta_n<F: Float>(wavelength: F, weather: &Weather<F>) -> F {
    // Wave number in 1/micron.
    let wave_num_sq = (c::<F>(1.0e3) / wavelength).powi(2);

    let dry_air_term = c::<F>(2371.34)
        + c::<F>(683939.7) / (c::<F>(130.) - wave_num_sq)
        + c::<F>(4547.3) / (c::<F>(38.9) - wave_num_sq);
    let wet_air_term = c::<F>(6487.31) + c::<F>(58.058) * wave_num_sq
        - c::<F>(0.71150) * wave_num_sq.powi(2)
        + c::<F>(0.08851) * wave_num_sq.powi(3);

    dry_air_term * density_factor_dry(weather) + wet_air_term * density_factor_water(weather)
}

/// Density factor of dry air. Pressures enter in millibar.
fn density_factor_dry<F: Float>(weather: &Weather<F>) -> F {
    let temperature = weather.temperature + c(273.15);
    let water_vapor_pressure = humidity_to_pressure(weather) * c(0.01);
    let dry_pressure = weather.pressure * c::<F>(0.01) - water_vapor_pressure;

    let eqn = dry_pressure
        * (c::<F>(57.90e-8) - c::<F>(9.3250e-4) / temperature
            + c::<F>(0.25844) / temperature.powi(2));
    (F::one() + eqn) * dry_pressure / temperature
}

/// Density factor of water vapour. Pressures enter in millibar.
fn density_factor_water<F: Float>(weather: &Weather<F>) -> F {
    let temperature = weather.temperature + c(273.15);
    let water_vapor_pressure = humidity_to_pressure(weather) * c(0.01);

    let density_factor_1 = c::<F>(-2.37321e-3) + c::<F>(2.23366) / temperature
        - c::<F>(710.792) / temperature.powi(2)
        + c::<F>(7.75141e4) / temperature.powi(3);
    let density_factor_2 = water_vapor_pressure / temperature;
    let density_factor_3 =
        water_vapor_pressure * (F::one() + c::<F>(3.7e-4) * water_vapor_pressure);

    (F::one() + density_factor_3 * density_factor_1) * density_factor_2
}

/// Water vapour pressure in Pascal, from relative humidity via the dew point.
fn humidity_to_pressure<F: Float>(weather: &Weather<F>) -> F {
    let x = (weather.humidity / c(100.)).ln();
    let temperature = weather.temperature;
    let temperature_eqn = (temperature + c(238.3)) * x + c::<F>(17.2694) * temperature;
    let dew_point =
        c::<F>(238.3) * temperature_eqn / (c::<F>(17.2694) * (temperature + c(238.3)) - temperature_eqn);

    // Saturation pressure polynomial in Torr, converted to Pascal.
    (c::<F>(4.50874) + c::<F>(0.341724) * dew_point
        + c::<F>(0.0106778) * dew_point.powi(2)
        + c::<F>(0.184889e-3) * dew_point.powi(3)
        + c::<F>(0.238294e-5) * dew_point.powi(4)
        + c::<F>(0.203447e-7) * dew_point.powi(5))
        * c(133.32239)
}
