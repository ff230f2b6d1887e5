use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use super::{DepartureSource, ScheduledDeparture, TelemetrySource, UpstreamError, VehicleMode};
use crate::brigades::normalize_brigade;
use crate::fetch::{HttpClient, UrlParam};
use crate::geo::LatLon;
use crate::matcher::VehicleReport;
use crate::time::ScheduleTime;

pub const API_BASE_URL: &str = "https://api.um.warszawa.pl/api/action";

const TIMETABLE_RESOURCE: &str = "e923fa0e-d96c-43f9-ae6e-60518c9f3238";
const POSITIONS_RESOURCE: &str = "f2e5503e-927d-4ad3-9500-4ab9e55deb59";
const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Client for the Warsaw open-data API. The key travels as the `apikey`
/// query parameter on every request.
pub struct WarsawApi<C> {
    client: UrlParam<C>,
    base_url: String,
}

impl<C: HttpClient> WarsawApi<C> {
    pub fn new(inner: C, api_key: String) -> Self {
        Self {
            client: UrlParam::new(inner, "apikey", api_key),
            base_url: API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json(&self, url: Url) -> Result<Value, UpstreamError> {
        let req = reqwest::Request::new(reqwest::Method::GET, url);
        let resp = self.client.execute(req).await?.error_for_status()?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Splits a GTFS stop id into the API's `busstopId` (stop group, first four
/// characters) and `busstopNr` (post within the group).
pub(crate) fn split_stop_id(stop_id: &str) -> (&str, &str) {
    let at = stop_id
        .char_indices()
        .nth(4)
        .map(|(i, _)| i)
        .unwrap_or(stop_id.len());
    stop_id.split_at(at)
}

pub(crate) fn departures_url(
    base_url: &str,
    route_id: &str,
    stop_id: &str,
) -> Result<Url, UpstreamError> {
    let (group, post) = split_stop_id(stop_id);
    Url::parse_with_params(
        &format!("{base_url}/dbtimetable_get/"),
        &[
            ("id", TIMETABLE_RESOURCE),
            ("busstopId", group),
            ("busstopNr", post),
            ("line", route_id),
        ],
    )
    .map_err(|e| UpstreamError::InvalidUrl(e.to_string()))
}

pub(crate) fn positions_url(base_url: &str, mode: VehicleMode) -> Result<Url, UpstreamError> {
    Url::parse_with_params(
        &format!("{base_url}/busestrams_get/"),
        &[
            ("resource_id", POSITIONS_RESOURCE.to_string()),
            ("type", mode.code().to_string()),
        ],
    )
    .map_err(|e| UpstreamError::InvalidUrl(e.to_string()))
}

/// Reads a `dbtimetable_get` body. Entries missing the brigade or time are
/// skipped.
pub fn parse_departures(body: &Value) -> Result<Vec<ScheduledDeparture>, UpstreamError> {
    let result = body
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::Malformed {
            what: "timetable".to_string(),
        })?;

    let departures = result
        .iter()
        .filter_map(|entry| {
            let values = entry.get("values")?.as_array()?;
            let mut brigade = None;
            let mut time = None;
            for pair in values {
                let value = pair.get("value").and_then(Value::as_str);
                match pair.get("key").and_then(Value::as_str) {
                    Some("brygada") => brigade = value,
                    Some("czas") => time = value,
                    _ => {}
                }
            }

            let (Some(brigade), Some(time)) = (brigade, time) else {
                warn!(entry = %entry, "Timetable entry without brigade or time");
                return None;
            };
            match time.parse::<ScheduleTime>() {
                Ok(time) => Some(ScheduledDeparture {
                    brigade_id: normalize_brigade(brigade),
                    time,
                }),
                Err(e) => {
                    warn!(error = %e, "Timetable entry with unparsable time");
                    None
                }
            }
        })
        .collect();

    Ok(departures)
}

/// Reads a `busestrams_get` body into reports. Items with missing fields or
/// an unparsable timestamp are skipped.
pub fn parse_vehicles(body: &Value, mode: VehicleMode) -> Result<Vec<VehicleReport>, UpstreamError> {
    let result = body
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::Malformed {
            what: format!("{mode} positions"),
        })?;

    let mut skipped = 0usize;
    let reports: Vec<VehicleReport> = result
        .iter()
        .filter_map(|item| {
            let report = parse_vehicle(item);
            if report.is_none() {
                skipped += 1;
            }
            report
        })
        .collect();

    if skipped > 0 {
        warn!(mode = %mode, skipped, "Unreadable vehicle positions");
    }

    Ok(reports)
}

fn parse_vehicle(item: &Value) -> Option<VehicleReport> {
    let lat = item.get("Lat")?.as_f64()?;
    let lon = item.get("Lon")?.as_f64()?;
    let route_id = item.get("Lines")?.as_str()?.trim();
    let brigade = item.get("Brigade")?.as_str()?;
    let time = item.get("Time")?.as_str()?;
    let timestamp = NaiveDateTime::parse_from_str(time, REPORT_TIME_FORMAT).ok()?;
    let vehicle_number = item
        .get("VehicleNumber")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(VehicleReport {
        route_id: route_id.to_string(),
        brigade_id: normalize_brigade(brigade),
        position: LatLon::new(lat, lon),
        timestamp,
        vehicle_number,
    })
}

#[async_trait]
impl<C: HttpClient> DepartureSource for WarsawApi<C> {
    async fn departures(
        &self,
        route_id: &str,
        stop_id: &str,
    ) -> Result<Vec<ScheduledDeparture>, UpstreamError> {
        let url = departures_url(&self.base_url, route_id, stop_id)?;
        debug!(route_id, stop_id, "Querying stop timetable");
        let body = self.get_json(url).await?;
        parse_departures(&body)
    }
}

#[async_trait]
impl<C: HttpClient> TelemetrySource for WarsawApi<C> {
    async fn vehicles(&self, mode: VehicleMode) -> Result<Vec<VehicleReport>, UpstreamError> {
        let url = positions_url(&self.base_url, mode)?;
        let body = self.get_json(url).await?;
        parse_vehicles(&body, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_stop_id() {
        assert_eq!(split_stop_id("700101"), ("7001", "01"));
        assert_eq!(split_stop_id("7001"), ("7001", ""));
        assert_eq!(split_stop_id("70"), ("70", ""));
    }

    #[test]
    fn test_departures_url_has_stop_and_line() {
        let url = departures_url(API_BASE_URL, "523", "700101").unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/api/action/dbtimetable_get/");
        assert!(query.contains(&("busstopId".to_string(), "7001".to_string())));
        assert!(query.contains(&("busstopNr".to_string(), "01".to_string())));
        assert!(query.contains(&("line".to_string(), "523".to_string())));
    }

    #[test]
    fn test_positions_url_mode_type() {
        let url = positions_url(API_BASE_URL, VehicleMode::Tram).unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "type" && v == "2"));
    }

    #[test]
    fn test_parse_departures() {
        let body = json!({
            "result": [
                {"values": [
                    {"key": "symbol_2", "value": "null"},
                    {"key": "brygada", "value": "05"},
                    {"key": "kierunek", "value": "Dworzec Centralny"},
                    {"key": "czas", "value": "05:12:00"}
                ]},
                {"values": [
                    {"key": "brygada", "value": "12"},
                    {"key": "czas", "value": "24:03:00"}
                ]},
                {"values": [{"key": "brygada", "value": "7"}]},
                {"values": [
                    {"key": "brygada", "value": "8"},
                    {"key": "czas", "value": "soon"}
                ]}
            ]
        });

        let departures = parse_departures(&body).unwrap();

        assert_eq!(
            departures,
            vec![
                ScheduledDeparture {
                    brigade_id: "5".to_string(),
                    time: ScheduleTime::new(5, 12, 0),
                },
                ScheduledDeparture {
                    brigade_id: "12".to_string(),
                    time: ScheduleTime::new(24, 3, 0),
                },
            ]
        );
    }

    #[test]
    fn test_parse_departures_malformed() {
        let body = json!({"result": "Błędna metoda lub parametry wywołania"});
        let err = parse_departures(&body).unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed { .. }));

        assert!(parse_departures(&json!({})).is_err());
    }

    #[test]
    fn test_parse_vehicles() {
        let body = json!({
            "result": [
                {"Lines": "523", "Lon": 21.0122, "VehicleNumber": "1000",
                 "Time": "2026-10-14 08:00:05", "Lat": 52.2297, "Brigade": "03"},
                {"Lines": "17", "Lon": 21.0, "Time": "not a time", "Lat": 52.0, "Brigade": "1"},
                {"Lines": "4", "Time": "2026-10-14 08:00:05", "Brigade": "1"}
            ]
        });

        let reports = parse_vehicles(&body, VehicleMode::Bus).unwrap();

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.route_id, "523");
        assert_eq!(report.brigade_id, "3");
        assert_eq!(report.position, LatLon::new(52.2297, 21.0122));
        assert_eq!(report.vehicle_number.as_deref(), Some("1000"));
        assert_eq!(report.timestamp.to_string(), "2026-10-14 08:00:05");
    }

    #[test]
    fn test_parse_vehicles_malformed() {
        let err = parse_vehicles(&json!({"result": false}), VehicleMode::Tram).unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed tram positions response: result is not a list"
        );
    }
}
