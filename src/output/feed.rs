//! GTFS-Realtime feed assembly.

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Europe::Warsaw;

use crate::alerts::Alert;
use crate::gtfs_rt::{
    self, EntitySelector, FeedEntity, FeedHeader, FeedMessage, Position, TranslatedString,
    TripDescriptor, VehicleDescriptor, VehiclePosition, feed_header::Incrementality,
    translated_string::Translation,
};
use crate::matcher::VehicleDecision;

pub const GTFS_RT_VERSION: &str = "2.0";

/// Unix seconds for a Warsaw wall-clock time. Times skipped by the spring
/// DST change are read as UTC.
pub fn unix_time(local: NaiveDateTime) -> u64 {
    let seconds = Warsaw
        .from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| local.and_utc().timestamp());
    u64::try_from(seconds).unwrap_or_default()
}

fn header(now: NaiveDateTime) -> FeedHeader {
    FeedHeader {
        gtfs_realtime_version: GTFS_RT_VERSION.to_string(),
        incrementality: Some(Incrementality::FullDataset as i32),
        timestamp: Some(unix_time(now)),
        feed_version: None,
    }
}

fn text(value: &str) -> TranslatedString {
    TranslatedString {
        translation: vec![Translation {
            text: value.to_string(),
            language: None,
        }],
    }
}

/// One vehicle-position entity per decision, in iteration order.
pub fn vehicles_feed<'a, I>(decisions: I, now: NaiveDateTime) -> FeedMessage
where
    I: IntoIterator<Item = &'a VehicleDecision>,
{
    let entity = decisions
        .into_iter()
        .map(|decision| FeedEntity {
            id: decision.id.clone(),
            is_deleted: None,
            trip_update: None,
            alert: None,
            vehicle: Some(VehiclePosition {
                trip: Some(TripDescriptor {
                    trip_id: Some(decision.trip_id.clone()),
                    route_id: Some(decision.route_id.clone()),
                    ..Default::default()
                }),
                vehicle: Some(VehicleDescriptor {
                    id: Some(decision.id.clone()),
                    label: decision.vehicle_number.clone(),
                    license_plate: None,
                }),
                position: Some(Position {
                    latitude: decision.lat as f32,
                    longitude: decision.lon as f32,
                    bearing: decision.bearing.map(|b| b as f32),
                    odometer: None,
                    speed: None,
                }),
                timestamp: Some(unix_time(decision.timestamp)),
                ..Default::default()
            }),
        })
        .collect();

    FeedMessage {
        header: header(now),
        entity,
    }
}

pub fn alerts_feed(alerts: &[Alert], now: NaiveDateTime) -> FeedMessage {
    let entity = alerts
        .iter()
        .map(|alert| FeedEntity {
            id: alert.id.clone(),
            is_deleted: None,
            trip_update: None,
            vehicle: None,
            alert: Some(gtfs_rt::Alert {
                informed_entity: alert
                    .routes
                    .iter()
                    .map(|route_id| EntitySelector {
                        route_id: Some(route_id.clone()),
                        ..Default::default()
                    })
                    .collect(),
                effect: Some(alert.effect.to_proto() as i32),
                url: (!alert.link.is_empty()).then(|| text(&alert.link)),
                header_text: Some(text(&alert.title)),
                description_text: (!alert.body.is_empty()).then(|| text(&alert.body)),
                ..Default::default()
            }),
        })
        .collect();

    FeedMessage {
        header: header(now),
        entity,
    }
}
