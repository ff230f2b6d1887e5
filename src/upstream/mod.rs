//! Live data sources: scheduled departures per stop and vehicle telemetry.
//!
//! [`DepartureSource`] and [`TelemetrySource`] are the seams the brigade
//! builder and the positions loop are written against; [`WarsawApi`] is the
//! production implementation over the city open-data API.

mod warsaw;

pub use warsaw::{WarsawApi, parse_departures, parse_vehicles};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::{error, info};

use crate::matcher::VehicleReport;
use crate::time::ScheduleTime;

#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The response parsed but its `result` is not a list, which is how the
    /// API reports overload and key problems.
    #[error("malformed {what} response: result is not a list")]
    Malformed { what: String },
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream response is not JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
}

/// One row of a stop's timetable as reported by the live API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledDeparture {
    pub brigade_id: String,
    pub time: ScheduleTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleMode {
    Bus = 1,
    Tram = 2,
}

impl VehicleMode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for VehicleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleMode::Bus => f.write_str("bus"),
            VehicleMode::Tram => f.write_str("tram"),
        }
    }
}

#[async_trait]
pub trait DepartureSource: Send + Sync {
    async fn departures(
        &self,
        route_id: &str,
        stop_id: &str,
    ) -> Result<Vec<ScheduledDeparture>, UpstreamError>;
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn vehicles(&self, mode: VehicleMode) -> Result<Vec<VehicleReport>, UpstreamError>;
}

/// Fetches trams, then buses. A failed mode is logged and contributes no
/// reports; it never blocks the other one.
pub async fn collect_vehicles<S: TelemetrySource + ?Sized>(source: &S) -> Vec<VehicleReport> {
    let mut reports = Vec::new();

    for mode in [VehicleMode::Tram, VehicleMode::Bus] {
        match source.vehicles(mode).await {
            Ok(batch) => {
                info!(mode = %mode, vehicles = batch.len(), "Positions fetched");
                reports.extend(batch);
            }
            Err(e) => error!(mode = %mode, error = %e, "Incorrect positions response"),
        }
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLon;
    use chrono::NaiveDate;

    struct HalfBroken;

    #[async_trait]
    impl TelemetrySource for HalfBroken {
        async fn vehicles(&self, mode: VehicleMode) -> Result<Vec<VehicleReport>, UpstreamError> {
            match mode {
                VehicleMode::Tram => Err(UpstreamError::Malformed {
                    what: "tram positions".to_string(),
                }),
                VehicleMode::Bus => Ok(vec![VehicleReport {
                    route_id: "523".to_string(),
                    brigade_id: "3".to_string(),
                    position: LatLon::new(52.2, 21.0),
                    timestamp: NaiveDate::from_ymd_opt(2026, 10, 14)
                        .unwrap()
                        .and_hms_opt(8, 0, 0)
                        .unwrap(),
                    vehicle_number: None,
                }]),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_mode_does_not_block_other() {
        let reports = collect_vehicles(&HalfBroken).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].route_id, "523");
    }

    #[test]
    fn test_mode_codes() {
        assert_eq!(VehicleMode::Bus.code(), 1);
        assert_eq!(VehicleMode::Tram.code(), 2);
        assert_eq!(VehicleMode::Tram.to_string(), "tram");
    }
}
