//! WGS-84 to GCJ-02 coordinate transformation.
//!
//! Stored coordinates are always WGS-84. Deployments rendering against
//! GCJ-02 ("alternate region") map tiles apply this transform at read
//! time; the rows themselves are never rewritten.
//!
//! Standard Krasovsky-1940 based obfuscation transform. Coordinates
//! outside the affected region pass through unchanged.

use std::f64::consts::PI;

const EARTH_RADIUS: f64 = 6_378_245.0;
const ECCENTRICITY_SQ: f64 = 0.006_693_421_622_965_943;

/// Transform a WGS-84 coordinate pair into GCJ-02.
///
/// Pure function; returns the input unchanged for coordinates outside
/// the region the transform applies to.
pub fn wgs_to_gcj(latitude: f64, longitude: f64) -> (f64, f64) {
    if out_of_region(latitude, longitude) {
        return (latitude, longitude);
    }

    let d_lat = delta_lat(longitude - 105.0, latitude - 35.0);
    let d_lon = delta_lon(longitude - 105.0, latitude - 35.0);

    let rad_lat = latitude / 180.0 * PI;
    let mut magic = rad_lat.sin();
    magic = 1.0 - ECCENTRICITY_SQ * magic * magic;
    let sqrt_magic = magic.sqrt();

    let d_lat =
        (d_lat * 180.0) / ((EARTH_RADIUS * (1.0 - ECCENTRICITY_SQ)) / (magic * sqrt_magic) * PI);
    let d_lon = (d_lon * 180.0) / (EARTH_RADIUS / sqrt_magic * rad_lat.cos() * PI);

    (latitude + d_lat, longitude + d_lon)
}

fn out_of_region(lat: f64, lon: f64) -> bool {
    !(72.004..=137.8347).contains(&lon) || !(0.8293..=55.8271).contains(&lat)
}

fn delta_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0
        + 2.0 * x
        + 3.0 * y
        + 0.2 * y * y
        + 0.1 * x * y
        + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn delta_lon(x: f64, y: f64) -> f64 {
    let mut ret =
        300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}
