//! Schedule index: `(route, stop, scheduled time) -> trip` for the routes
//! and services running on one date.
//!
//! The index is drained by the brigade builder as departures get matched,
//! so every trip is assigned to at most one brigade.

pub mod archive;
pub mod feed;

pub use feed::{RouteRow, ScheduleFeed, StopTimeRow, TripRow};

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use crate::geo::LatLon;
use crate::time::ScheduleTime;

/// GTFS `route_type` codes for tram and bus.
pub const DEFAULT_ROUTE_TYPES: [i32; 2] = [0, 3];

/// Which vehicle modes take part in brigade matching.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub route_types: Vec<i32>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            route_types: DEFAULT_ROUTE_TYPES.to_vec(),
        }
    }
}

/// Where and when a trip ends.
#[derive(Debug, Clone, PartialEq)]
pub struct TripSummary {
    pub trip_id: String,
    pub last_stop: LatLon,
    pub last_time: ScheduleTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StopRoute {
    pub route_id: String,
    pub stop_id: String,
}

impl StopRoute {
    pub fn new(route_id: impl Into<String>, stop_id: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            stop_id: stop_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub time: ScheduleTime,
    pub trip_id: String,
}

#[derive(Debug, Default)]
pub struct ScheduleIndex {
    departures: BTreeMap<StopRoute, Vec<Departure>>,
    trip_pairs: HashMap<String, Vec<StopRoute>>,
    summaries: HashMap<String, TripSummary>,
}

impl ScheduleIndex {
    pub fn build(feed: &ScheduleFeed, options: &IndexOptions) -> Self {
        let eligible_routes: HashSet<&str> = feed
            .routes
            .iter()
            .filter(|r| options.route_types.contains(&r.route_type))
            .map(|r| r.route_id.as_str())
            .collect();

        let trip_routes: HashMap<&str, &str> = feed
            .trips
            .iter()
            .filter(|t| {
                eligible_routes.contains(t.route_id.as_str())
                    && feed.active_services.contains(&t.service_id)
            })
            .map(|t| (t.trip_id.as_str(), t.route_id.as_str()))
            .collect();

        let mut by_trip: HashMap<&str, Vec<&StopTimeRow>> = HashMap::new();
        for row in feed
            .stop_times
            .iter()
            .filter(|r| trip_routes.contains_key(r.trip_id.as_str()))
        {
            by_trip.entry(row.trip_id.as_str()).or_default().push(row);
        }

        let mut index = Self::default();
        let mut unknown_stops = 0usize;
        let mut unknown_last_stops = 0usize;

        for (trip_id, rows) in by_trip {
            let Some(last) = rows.iter().max_by_key(|r| (r.stop_sequence, r.time)) else {
                continue;
            };
            // The trip's end is unknown, so it cannot be assigned at all
            let Some(&last_stop) = feed.stops.get(&last.stop_id) else {
                unknown_last_stops += 1;
                continue;
            };
            let route_id = trip_routes[trip_id];

            index.summaries.insert(
                trip_id.to_string(),
                TripSummary {
                    trip_id: trip_id.to_string(),
                    last_stop,
                    last_time: last.time,
                },
            );

            let pairs = index.trip_pairs.entry(trip_id.to_string()).or_default();
            for row in rows {
                if !feed.stops.contains_key(&row.stop_id) {
                    unknown_stops += 1;
                    continue;
                }
                let key = StopRoute::new(route_id, row.stop_id.as_str());
                index
                    .departures
                    .entry(key.clone())
                    .or_default()
                    .push(Departure {
                        time: row.time,
                        trip_id: trip_id.to_string(),
                    });
                if !pairs.contains(&key) {
                    pairs.push(key);
                }
            }
        }

        if unknown_stops > 0 {
            warn!(rows = unknown_stops, "Stop times reference unknown stops, skipped");
        }
        if unknown_last_stops > 0 {
            warn!(trips = unknown_last_stops, "Trips ending at unknown stops, skipped");
        }

        for departures in index.departures.values_mut() {
            departures.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.trip_id.cmp(&b.trip_id)));
        }

        debug!(
            trips = index.summaries.len(),
            pairs = index.departures.len(),
            "Schedule index built"
        );

        index
    }

    /// Resolves a departure to a trip, retrying with the hour shifted by 24
    /// for departures the source writes in 0-23 form.
    pub fn trip_for_departure(
        &self,
        route_id: &str,
        stop_id: &str,
        time: ScheduleTime,
    ) -> Option<&str> {
        let departures = self.departures.get(&StopRoute::new(route_id, stop_id))?;
        let find = |wanted: ScheduleTime| {
            departures
                .iter()
                .find(|d| d.time == wanted)
                .map(|d| d.trip_id.as_str())
        };
        find(time).or_else(|| find(time.plus_day()))
    }

    pub fn pending_departures(&self, route_id: &str, stop_id: &str) -> &[Departure] {
        self.departures
            .get(&StopRoute::new(route_id, stop_id))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First remaining `(route, stop)` pair, in key order.
    pub fn next_pair(&self) -> Option<StopRoute> {
        self.departures.keys().next().cloned()
    }

    pub fn summary(&self, trip_id: &str) -> Option<&TripSummary> {
        self.summaries.get(trip_id)
    }

    /// Drops every departure of `trip_id` from every pair.
    pub fn remove_trip(&mut self, trip_id: &str) {
        let Some(pairs) = self.trip_pairs.remove(trip_id) else {
            return;
        };
        for key in pairs {
            if let Some(departures) = self.departures.get_mut(&key) {
                departures.retain(|d| d.trip_id != trip_id);
                if departures.is_empty() {
                    self.departures.remove(&key);
                }
            }
        }
    }

    pub fn remove_departures_for(&mut self, route_id: &str, stop_id: &str) {
        self.departures.remove(&StopRoute::new(route_id, stop_id));
    }

    pub fn is_empty(&self) -> bool {
        self.departures.is_empty()
    }

    pub fn pair_count(&self) -> usize {
        self.departures.len()
    }

    pub fn trip_count(&self) -> usize {
        self.summaries.len()
    }
}
