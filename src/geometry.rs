//! Observation geometry: observatory site, weather, and per-exposure pointing.
//!
//! These are plain immutable value types, consumed by [`calculate_dcr`](crate::dcr::calculate_dcr)
//! and friends. In a full pipeline they would be filled from exposure metadata; here they mirror
//! the fields of `lsst.afw.image.VisitInfo` that the DCR calculation actually reads. All angles
//! are in radians.

use crate::error::DcrError;
use crate::Float;

/// Atmospheric conditions at the time of an observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weather<F: Float> {
    /// Outside air temperature in degrees Celsius.
    pub temperature: F,
    /// Outside air pressure in Pascal.
    pub pressure: F,
    /// Relative humidity in percent.
    pub humidity: F,
}

/// Location of the observatory.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observatory<F: Float> {
    /// Longitude in radians, positive East.
    pub longitude: F,
    /// Latitude in radians, positive North.
    pub latitude: F,
    /// Elevation above sea level in meter.
    pub elevation: F,
}

/// A point on the sphere as a longitude/latitude pair in radians.
///
/// Used both for equatorial (RA/Dec) and horizontal (azimuth/elevation) coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpherePoint<F: Float> {
    /// Longitude-like coordinate (RA or azimuth) in radians.
    pub longitude: F,
    /// Latitude-like coordinate (Dec or elevation) in radians.
    pub latitude: F,
}

/// Pointing and orientation of a single exposure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisitInfo<F: Float> {
    /// Earth rotation angle in radians.
    pub era: F,
    /// Boresight equatorial coordinates.
    pub boresight_ra_dec: SpherePoint<F>,
    /// Boresight horizontal coordinates.
    pub boresight_az_alt: SpherePoint<F>,
    /// Airmass at the boresight.
    pub boresight_airmass: F,
    /// Rotation of the instrument relative to the sky, in radians.
    pub boresight_rot_angle: F,
    /// Observatory location.
    pub observatory: Observatory<F>,
    /// Weather during the exposure.
    pub weather: Weather<F>,
}

impl<F: Float> VisitInfo<F> {
    /// Boresight elevation above the horizon in radians.
    pub fn elevation(&self) -> F {
        self.boresight_az_alt.latitude
    }

    /// Boresight azimuth in radians.
    pub fn azimuth(&self) -> F {
        self.boresight_az_alt.longitude
    }

    /// Hour angle of the boresight, `era + longitude - ra`.
    pub fn boresight_hour_angle(&self) -> F {
        self.era + self.observatory.longitude - self.boresight_ra_dec.longitude
    }

    /// Parallactic angle of the boresight: the position angle of the local zenith, measured from
    /// North through East.
    pub fn boresight_par_angle(&self) -> F {
        let hour_angle = self.boresight_hour_angle();
        let dec = self.boresight_ra_dec.latitude;
        let latitude = self.observatory.latitude;
        F::atan2(
            hour_angle.sin(),
            dec.cos() * latitude.tan() - dec.sin() * hour_angle.cos(),
        )
    }
}

/// Airmass of an observation, approximated as the secant of the zenith angle.
///
/// Elevations at or below the horizon have no defined airmass and are rejected.
pub fn airmass<F: Float>(elevation: F) -> Result<F, DcrError> {
    if elevation <= F::zero() {
        return Err(DcrError::InvalidElevation);
    }
    Ok(F::one() / elevation.sin())
}
