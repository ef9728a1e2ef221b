//! Forward geocoding and zone assignment.
//!
//! Addresses are resolved against a Google-format geocoding endpoint
//! (configurable base URL, 5 s timeout). Results outside the Canadian
//! service area are rejected before any row is written. Zone assignment
//! picks the nearest zone center by Haversine distance over the `zones`
//! table; centers are operational data, never constants in code.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use berthcare_core::config::GeocoderConfig;
use berthcare_core::{ApiError, Result};

pub const GEOCODE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Canadian service-area bounding box.
const LAT_RANGE: (f64, f64) = (41.6, 83.2);
const LNG_RANGE: (f64, f64) = (-141.1, -52.5);

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Canonicalized address as returned by the provider.
    pub formatted_address: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeoPoint>;
}

pub fn within_service_area(latitude: f64, longitude: f64) -> bool {
    (LAT_RANGE.0..=LAT_RANGE.1).contains(&latitude)
        && (LNG_RANGE.0..=LNG_RANGE.1).contains(&longitude)
}

pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Nearest zone center for a coordinate. `None` when no zones exist.
pub fn nearest_zone(latitude: f64, longitude: f64, zones: &[(Uuid, f64, f64)]) -> Option<Uuid> {
    zones
        .iter()
        .min_by(|a, b| {
            let da = haversine_km(latitude, longitude, a.1, a.2);
            let db = haversine_km(latitude, longitude, b.1, b.2);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|z| z.0)
}

// Provider response shape (Google geocoding format).
#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

pub struct HttpGeocoder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGeocoder {
    pub fn new(cfg: &GeocoderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(GEOCODE_TIMEOUT)
            .build()
            .map_err(|e| ApiError::internal(format!("failed to build geocoder client: {e}")))?;
        Ok(Self { http, base_url: cfg.base_url.clone(), api_key: cfg.api_key.clone() })
    }

    fn parse(body: GeocodeResponse) -> Result<GeoPoint> {
        match body.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Err(ApiError::geocoding("address not found")),
            other => return Err(ApiError::geocoding(format!("provider returned {other}"))),
        }
        let first = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::geocoding("provider returned no results"))?;
        Ok(GeoPoint {
            latitude: first.geometry.location.lat,
            longitude: first.geometry.location.lng,
            formatted_address: first.formatted_address,
        })
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeoPoint> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ApiError::geocoding(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ApiError::geocoding(format!(
                "provider responded with {}",
                response.status()
            )));
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| ApiError::geocoding(format!("malformed provider response: {e}")))?;
        Self::parse(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TORONTO: (f64, f64) = (43.6517, -79.3839);
    const VANCOUVER: (f64, f64) = (49.2827, -123.1207);

    #[test]
    fn test_service_area_bounds() {
        assert!(within_service_area(TORONTO.0, TORONTO.1));
        assert!(within_service_area(VANCOUVER.0, VANCOUVER.1));
        // Seattle: south of the box.
        assert!(!within_service_area(40.7128, -74.0060));
        // Reykjavik: east of the box.
        assert!(!within_service_area(64.1466, -21.9426));
    }

    #[test]
    fn test_haversine_toronto_vancouver() {
        let km = haversine_km(TORONTO.0, TORONTO.1, VANCOUVER.0, VANCOUVER.1);
        assert!((3_300.0..3_400.0).contains(&km), "got {km}");
        assert!(haversine_km(TORONTO.0, TORONTO.1, TORONTO.0, TORONTO.1) < 0.001);
    }

    #[test]
    fn test_nearest_zone_picks_closest_center() {
        let to = Uuid::new_v4();
        let va = Uuid::new_v4();
        let zones = vec![(to, TORONTO.0, TORONTO.1), (va, VANCOUVER.0, VANCOUVER.1)];

        // Mississauga is near Toronto.
        assert_eq!(nearest_zone(43.5890, -79.6441, &zones), Some(to));
        // Burnaby is near Vancouver.
        assert_eq!(nearest_zone(49.2488, -122.9805, &zones), Some(va));
        assert_eq!(nearest_zone(43.6, -79.4, &[]), None);
    }

    #[test]
    fn test_parse_ok_response() {
        let body: GeocodeResponse = serde_json::from_value(serde_json::json!({
            "status": "OK",
            "results": [{
                "formatted_address": "100 Queen St W, Toronto, ON M5H 2N1, Canada",
                "geometry": { "location": { "lat": 43.6525, "lng": -79.3835 } }
            }]
        }))
        .unwrap();
        let point = HttpGeocoder::parse(body).unwrap();
        assert_eq!(point.latitude, 43.6525);
        assert!(point.formatted_address.contains("Toronto"));
    }

    #[test]
    fn test_parse_zero_results() {
        let body: GeocodeResponse =
            serde_json::from_value(serde_json::json!({ "status": "ZERO_RESULTS" })).unwrap();
        let err = HttpGeocoder::parse(body).unwrap_err();
        assert_eq!(err.code(), berthcare_core::ErrorCode::GeocodingError);
    }
}
