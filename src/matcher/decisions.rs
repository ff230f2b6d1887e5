use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::geo::LatLon;

/// What the matcher concluded about one vehicle in one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDecision {
    pub id: String,
    pub route_id: String,
    pub brigade_id: String,
    pub trip_id: String,
    pub timestamp: NaiveDateTime,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_number: Option<String>,
}

impl VehicleDecision {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// Last decision per vehicle key, carried from one poll to the next.
///
/// Entries are only ever overwritten. A vehicle that stops reporting keeps
/// its last decision, so consumers go through [`Decisions::fresh`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decisions(BTreeMap<String, VehicleDecision>);

impl Decisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vehicle_key: &str) -> Option<&VehicleDecision> {
        self.0.get(vehicle_key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VehicleDecision> {
        self.0.values()
    }

    /// A copy of `self` with `decisions` written over it.
    pub fn merge(&self, decisions: impl IntoIterator<Item = VehicleDecision>) -> Decisions {
        let mut merged = self.clone();
        for decision in decisions {
            merged.0.insert(decision.id.clone(), decision);
        }
        merged
    }

    /// Decisions whose report is no older than `max_age` at `now`.
    pub fn fresh(
        &self,
        now: NaiveDateTime,
        max_age: TimeDelta,
    ) -> impl Iterator<Item = &VehicleDecision> {
        self.0
            .values()
            .filter(move |d| now.signed_duration_since(d.timestamp) <= max_age)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let decisions = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(decisions)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

impl FromIterator<VehicleDecision> for Decisions {
    fn from_iter<I: IntoIterator<Item = VehicleDecision>>(iter: I) -> Self {
        Decisions::new().merge(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn decision(id: &str, trip_id: &str, timestamp: NaiveDateTime) -> VehicleDecision {
        VehicleDecision {
            id: id.to_string(),
            route_id: "R".to_string(),
            brigade_id: "5".to_string(),
            trip_id: trip_id.to_string(),
            timestamp,
            lat: 52.2,
            lon: 21.0,
            bearing: None,
            vehicle_number: None,
        }
    }

    #[test]
    fn test_merge_overwrites_and_keeps_unreported() {
        let previous: Decisions = vec![
            decision("v-R-5", "T1", at(8, 0)),
            decision("v-R-6", "T7", at(8, 0)),
        ]
        .into_iter()
        .collect();

        let merged = previous.merge(vec![decision("v-R-5", "T2", at(8, 1))]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("v-R-5").unwrap().trip_id, "T2");
        assert_eq!(merged.get("v-R-6").unwrap().trip_id, "T7");
        // Input map is untouched
        assert_eq!(previous.get("v-R-5").unwrap().trip_id, "T1");
    }

    #[test]
    fn test_fresh_filters_stale_entries() {
        let decisions: Decisions = vec![
            decision("v-R-5", "T1", at(8, 0)),
            decision("v-R-6", "T7", at(8, 20)),
        ]
        .into_iter()
        .collect();

        let fresh: Vec<&str> = decisions
            .fresh(at(8, 25), TimeDelta::minutes(10))
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(fresh, vec!["v-R-6"]);
    }

    #[test]
    fn test_save_and_load() {
        let mut with_bearing = decision("v-R-5", "T1", at(8, 0));
        with_bearing.bearing = Some(91.5);
        let decisions: Decisions = vec![with_bearing, decision("v-R-6", "T7", at(8, 0))]
            .into_iter()
            .collect();

        let path = format!(
            "{}/warsaw_gtfs_rt_decisions_test.json",
            std::env::temp_dir().display()
        );
        decisions.save(&path).unwrap();
        let loaded = Decisions::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, decisions);
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let path = std::env::temp_dir()
            .join("warsaw_gtfs_rt_no_such_dir")
            .join("decisions.json");
        let err = Decisions::new().save(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to create"));
    }

    #[test]
    fn test_saved_file_is_complete_before_reuse() {
        let decisions: Decisions = (0..200)
            .map(|n| decision(&format!("v-R-{n}"), "T1", at(8, 0)))
            .collect();
        let path = std::env::temp_dir().join("warsaw_gtfs_rt_decisions_large.json");

        decisions.save(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(written.ends_with('}'));
        assert_eq!(serde_json::from_str::<Decisions>(&written).unwrap().len(), 200);
    }

    #[test]
    fn test_bearing_omitted_when_absent() {
        let json = serde_json::to_string(&decision("v-R-6", "T7", at(8, 0))).unwrap();
        assert!(!json.contains("bearing"));
        assert!(json.contains("\"timestamp\":\"2026-10-14T08:00:00\""));
    }
}
