//! Live vehicle-to-trip matching.
//!
//! Each poll the matcher looks at every vehicle report, finds the brigade's
//! trip list in the assignment table, and decides which trip the vehicle is
//! running. With a decision from the previous poll it only checks whether
//! that trip has finished: the vehicle is within [`MatchConfig::arrival_radius_km`]
//! of the trip's last stop, or the trip was scheduled to end more than
//! [`MatchConfig::completion_grace`] ago. Without one it assumes the vehicle
//! is on time and picks the first trip that has not ended yet.

mod decisions;

pub use decisions::{Decisions, VehicleDecision};

use chrono::{NaiveDateTime, TimeDelta};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::brigades::{AssignmentTable, BrigadeTrip, normalize_brigade};
use crate::geo::{LatLon, bearing_degrees, distance_km};
use crate::time::{ScheduleTime, happened_at_or_before};

/// One telemetry sample. Timestamps are local wall-clock time.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleReport {
    pub route_id: String,
    pub brigade_id: String,
    pub position: LatLon,
    pub timestamp: NaiveDateTime,
    pub vehicle_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Reports older than this are dropped.
    pub stale_after: TimeDelta,
    pub arrival_radius_km: f64,
    /// How long past its scheduled end a trip is still considered running.
    pub completion_grace: TimeDelta,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            stale_after: TimeDelta::minutes(10),
            arrival_radius_km: 0.05,
            completion_grace: TimeDelta::minutes(30),
        }
    }
}

pub fn vehicle_key(route_id: &str, brigade_id: &str) -> String {
    format!("v-{}-{}", route_id, normalize_brigade(brigade_id))
}

/// Matches one poll worth of reports.
///
/// Returns one decision per vehicle key that produced a usable report, in
/// key order. When a key reports more than once the newest report wins.
/// Reports for brigades missing from `table` and stale reports produce
/// nothing. Combine the result with [`Decisions::merge`].
pub fn match_cycle(
    reports: &[VehicleReport],
    table: &AssignmentTable,
    previous: &Decisions,
    now: NaiveDateTime,
    config: &MatchConfig,
) -> Vec<VehicleDecision> {
    let mut decided: BTreeMap<String, VehicleDecision> = BTreeMap::new();
    let mut unassigned = 0usize;
    let mut stale = 0usize;

    for report in reports {
        let brigade_id = normalize_brigade(&report.brigade_id);
        let Some(trips) = table.trips(&report.route_id, &brigade_id) else {
            unassigned += 1;
            continue;
        };

        if now.signed_duration_since(report.timestamp) > config.stale_after {
            stale += 1;
            continue;
        }

        let id = vehicle_key(&report.route_id, &brigade_id);
        if decided
            .get(&id)
            .is_some_and(|d| d.timestamp > report.timestamp)
        {
            continue;
        }

        let decision = decide(id, brigade_id, report, trips, previous, now, config);
        trace!(
            vehicle = %decision.id,
            trip_id = %decision.trip_id,
            bearing = ?decision.bearing,
            "Vehicle matched"
        );
        decided.insert(decision.id.clone(), decision);
    }

    debug!(
        reports = reports.len(),
        matched = decided.len(),
        unassigned,
        stale,
        "Poll matched"
    );

    decided.into_values().collect()
}

fn decide(
    id: String,
    brigade_id: String,
    report: &VehicleReport,
    trips: &[BrigadeTrip],
    previous: &Decisions,
    now: NaiveDateTime,
    config: &MatchConfig,
) -> VehicleDecision {
    let prior = previous.get(&id);

    let bearing = prior.and_then(|p| bearing_degrees(p.position(), report.position).or(p.bearing));
    let trip_id = prior
        .and_then(|p| continue_trip(&p.trip_id, trips, report.position, now, config))
        .unwrap_or_else(|| cold_start(trips, now).to_string());

    VehicleDecision {
        id,
        route_id: report.route_id.clone(),
        brigade_id,
        trip_id,
        timestamp: report.timestamp,
        lat: report.position.lat,
        lon: report.position.lon,
        bearing,
        vehicle_number: report.vehicle_number.clone(),
    }
}

/// Carries `prior_trip` forward, advancing to the next trip once it has
/// finished. `None` when the prior trip is not in the brigade's list.
fn continue_trip(
    prior_trip: &str,
    trips: &[BrigadeTrip],
    position: LatLon,
    now: NaiveDateTime,
    config: &MatchConfig,
) -> Option<String> {
    let last = trips.last()?;
    if last.trip_id == prior_trip {
        return Some(prior_trip.to_string());
    }

    let i = trips.iter().position(|t| t.trip_id == prior_trip)?;
    let current = &trips[i];

    let arrived = distance_km(position, current.last_stop_latlon) <= config.arrival_radius_km;
    let grace_cutoff = ScheduleTime::from_naive((now - config.completion_grace).time());
    let overdue = happened_at_or_before(current.last_stop_timepoint, grace_cutoff);

    if arrived || overdue {
        Some(trips[i + 1].trip_id.clone())
    } else {
        Some(prior_trip.to_string())
    }
}

/// First trip that has not ended by `now`, else the brigade's last trip.
fn cold_start(trips: &[BrigadeTrip], now: NaiveDateTime) -> &str {
    let clock = ScheduleTime::from_naive(now.time());
    trips
        .iter()
        .find(|t| happened_at_or_before(clock, t.last_stop_timepoint))
        .or(trips.last())
        .map(|t| t.trip_id.as_str())
        .unwrap_or_default()
}
