//! Great-circle geometry on raw WGS84 coordinates.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Below this distance GPS noise dominates and no heading is derived.
pub const MIN_BEARING_DISTANCE_KM: f64 = 0.003;

/// A coordinate pair, serialized as `[lat, lon]`.
///
/// Deserialization also accepts the two values as decimal strings, which is
/// how stop coordinates appear in published brigade files.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Haversine distance between two points in kilometers.
pub fn distance_km(p1: LatLon, p2: LatLon) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let delta_lat = (p2.lat - p1.lat).to_radians();
    let delta_lon = (p2.lon - p1.lon).to_radians();

    let a = (delta_lat * 0.5).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon * 0.5).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Initial compass bearing from `p1` towards `p2`, in degrees `[0, 360)`.
///
/// Returns `None` when the points are closer than
/// [`MIN_BEARING_DISTANCE_KM`].
pub fn bearing_degrees(p1: LatLon, p2: LatLon) -> Option<f64> {
    if distance_km(p1, p2) < MIN_BEARING_DISTANCE_KM {
        return None;
    }

    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let delta_lon = (p2.lon - p1.lon).to_radians();

    let x = delta_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    Some(x.atan2(y).to_degrees().rem_euclid(360.0))
}

impl Serialize for LatLon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.lat)?;
        tuple.serialize_element(&self.lon)?;
        tuple.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    fn into_f64<E: de::Error>(self) -> Result<f64, E> {
        match self {
            Coordinate::Number(n) => Ok(n),
            Coordinate::Text(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }
}

struct LatLonVisitor;

impl<'de> Visitor<'de> for LatLonVisitor {
    type Value = LatLon;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a [lat, lon] pair")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<LatLon, A::Error> {
        let lat: Coordinate = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let lon: Coordinate = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(LatLon::new(lat.into_f64()?, lon.into_f64()?))
    }
}

impl<'de> Deserialize<'de> for LatLon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(2, LatLonVisitor)
    }
}
