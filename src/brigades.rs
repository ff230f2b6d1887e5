//! Brigade assignment table: which trips each vehicle duty performs today.
//!
//! The table is derived by matching every `(route, stop)` pair of the
//! schedule index against the live timetable of that stop, which carries
//! brigade numbers the static schedule lacks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::geo::LatLon;
use crate::schedule::{ScheduleIndex, StopRoute};
use crate::time::ScheduleTime;
use crate::upstream::{DepartureSource, ScheduledDeparture};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrigadeTrip {
    pub trip_id: String,
    pub last_stop_latlon: LatLon,
    pub last_stop_timepoint: ScheduleTime,
}

/// `route -> brigade -> trips`, trips in the order the vehicle runs them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentTable {
    routes: BTreeMap<String, BTreeMap<String, Vec<BrigadeTrip>>>,
}

/// Brigade numbers arrive both as `"05"` and `"5"`.
pub fn normalize_brigade(brigade_id: &str) -> String {
    let trimmed = brigade_id.trim().trim_start_matches('0');
    if trimmed.is_empty() && !brigade_id.trim().is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Orders trip ids by the run number after their last `/`. Numeric run
/// numbers sort numerically and before any non-numeric ones.
pub fn compare_trip_sequence(a: &str, b: &str) -> Ordering {
    let suffix = |id: &'_ str| -> (Option<u64>, String) {
        let tail = id.rsplit('/').next().unwrap_or(id);
        (tail.parse::<u64>().ok(), tail.to_string())
    };
    match (suffix(a), suffix(b)) {
        ((Some(x), _), (Some(y), _)) => x.cmp(&y),
        ((Some(_), _), (None, _)) => Ordering::Less,
        ((None, _), (Some(_), _)) => Ordering::Greater,
        ((None, x), (None, y)) => x.cmp(&y),
    }
}

impl AssignmentTable {
    pub fn trips(&self, route_id: &str, brigade_id: &str) -> Option<&[BrigadeTrip]> {
        self.routes
            .get(route_id)?
            .get(brigade_id)
            .map(Vec::as_slice)
            .filter(|trips| !trips.is_empty())
    }

    pub fn push(&mut self, route_id: &str, brigade_id: &str, trip: BrigadeTrip) {
        self.routes
            .entry(route_id.to_string())
            .or_default()
            .entry(normalize_brigade(brigade_id))
            .or_default()
            .push(trip);
    }

    pub fn sort_trips(&mut self) {
        for trips in self.routes.values_mut().flat_map(BTreeMap::values_mut) {
            trips.sort_by(|a, b| compare_trip_sequence(&a.trip_id, &b.trip_id));
        }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn brigade_count(&self) -> usize {
        self.routes.values().map(BTreeMap::len).sum()
    }

    pub fn trip_count(&self) -> usize {
        self.routes
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[BrigadeTrip])> {
        self.routes.iter().flat_map(|(route, brigades)| {
            brigades
                .iter()
                .map(move |(brigade, trips)| (route.as_str(), brigade.as_str(), trips.as_slice()))
        })
    }

    /// Parses a published brigades file. Trips are re-sorted since external
    /// producers do not guarantee the order.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, Vec<BrigadeTrip>>> =
            serde_json::from_slice(bytes).context("Brigades file is not valid JSON")?;

        let mut table = Self::default();
        for (route_id, brigades) in raw {
            for (brigade_id, trips) in brigades {
                for trip in trips {
                    table.push(&route_id, &brigade_id, trip);
                }
            }
        }
        table.sort_trips();
        Ok(table)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Result of matching one `(route, stop)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairOutcome {
    pub matched: usize,
    pub unmatched: usize,
}

/// Drains a [`ScheduleIndex`] into an [`AssignmentTable`], one pair at a
/// time. Performs no I/O; the caller supplies each pair's departures.
pub struct BrigadeBuilder {
    index: ScheduleIndex,
    table: AssignmentTable,
}

impl BrigadeBuilder {
    pub fn new(index: ScheduleIndex) -> Self {
        Self {
            index,
            table: AssignmentTable::default(),
        }
    }

    pub fn next_pair(&self) -> Option<StopRoute> {
        self.index.next_pair()
    }

    pub fn remaining_pairs(&self) -> usize {
        self.index.pair_count()
    }

    /// Assigns every departure that resolves to a trip, then drops what is
    /// left of the pair.
    pub fn apply(&mut self, pair: &StopRoute, departures: &[ScheduledDeparture]) -> PairOutcome {
        let mut outcome = PairOutcome::default();

        for departure in departures {
            let resolved = self
                .index
                .trip_for_departure(&pair.route_id, &pair.stop_id, departure.time)
                .and_then(|trip_id| self.index.summary(trip_id))
                .cloned();

            let Some(summary) = resolved else {
                outcome.unmatched += 1;
                continue;
            };

            self.table.push(
                &pair.route_id,
                &departure.brigade_id,
                BrigadeTrip {
                    trip_id: summary.trip_id.clone(),
                    last_stop_latlon: summary.last_stop,
                    last_stop_timepoint: summary.last_time,
                },
            );
            self.index.remove_trip(&summary.trip_id);
            outcome.matched += 1;
        }

        self.index
            .remove_departures_for(&pair.route_id, &pair.stop_id);
        outcome
    }

    /// Drops a pair whose departures could not be fetched.
    pub fn skip(&mut self, pair: &StopRoute) {
        self.index
            .remove_departures_for(&pair.route_id, &pair.stop_id);
    }

    pub fn finish(mut self) -> AssignmentTable {
        self.table.sort_trips();
        self.table
    }
}

#[derive(Debug, Clone)]
pub struct FailedPair {
    pub pair: StopRoute,
    pub error: String,
}

#[derive(Debug)]
pub struct BuildReport {
    pub table: AssignmentTable,
    pub api_calls: usize,
    pub failed: Vec<FailedPair>,
}

/// Queries `source` once per remaining pair of `index`. A failed query is
/// logged and recorded; its pair contributes no trips.
#[tracing::instrument(skip_all, fields(pairs = index.pair_count(), trips = index.trip_count()))]
pub async fn build_assignments<S: DepartureSource + ?Sized>(
    index: ScheduleIndex,
    source: &S,
) -> BuildReport {
    let mut builder = BrigadeBuilder::new(index);
    let mut api_calls = 0usize;
    let mut failed = Vec::new();

    while let Some(pair) = builder.next_pair() {
        api_calls += 1;

        match source.departures(&pair.route_id, &pair.stop_id).await {
            Ok(departures) => {
                let outcome = builder.apply(&pair, &departures);
                debug!(
                    route_id = %pair.route_id,
                    stop_id = %pair.stop_id,
                    matched = outcome.matched,
                    unmatched = outcome.unmatched,
                    "Pair matched"
                );
            }
            Err(e) => {
                error!(
                    route_id = %pair.route_id,
                    stop_id = %pair.stop_id,
                    error = %e,
                    "Departures query failed"
                );
                builder.skip(&pair);
                failed.push(FailedPair {
                    pair,
                    error: e.to_string(),
                });
            }
        }

        if api_calls % 500 == 0 {
            info!(
                api_calls,
                remaining = builder.remaining_pairs(),
                "Brigade matching progress"
            );
        }
    }

    let table = builder.finish();
    if !failed.is_empty() {
        warn!(failed = failed.len(), "Some stop timetables could not be matched");
    }
    info!(
        api_calls,
        routes = table.route_count(),
        brigades = table.brigade_count(),
        trips = table.trip_count(),
        "Brigades built"
    );

    BuildReport {
        table,
        api_calls,
        failed,
    }
}
