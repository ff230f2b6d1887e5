//! Relational rows the schedule index is built from.

use std::collections::{HashMap, HashSet};

use crate::geo::LatLon;
use crate::time::ScheduleTime;

#[derive(Debug, Clone)]
pub struct RouteRow {
    pub route_id: String,
    pub route_type: i32,
}

#[derive(Debug, Clone)]
pub struct TripRow {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
}

/// One row of `stop_times.txt`.
#[derive(Debug, Clone)]
pub struct StopTimeRow {
    pub trip_id: String,
    pub stop_sequence: u32,
    pub time: ScheduleTime,
    pub stop_id: String,
}

/// A static schedule reduced to what brigade matching needs, for one
/// service date.
#[derive(Debug, Clone, Default)]
pub struct ScheduleFeed {
    pub routes: Vec<RouteRow>,
    pub trips: Vec<TripRow>,
    /// Service ids running on the date the feed was read for.
    pub active_services: HashSet<String>,
    pub stops: HashMap<String, LatLon>,
    /// In file order; rows of one trip need not be contiguous.
    pub stop_times: Vec<StopTimeRow>,
}
