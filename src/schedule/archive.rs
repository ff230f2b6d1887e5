//! Reads a GTFS zip archive into a [`ScheduleFeed`] for one service date.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Seek};
use tracing::{debug, info, warn};

use super::feed::{RouteRow, ScheduleFeed, StopTimeRow, TripRow};
use crate::geo::LatLon;

#[derive(Debug, Deserialize)]
struct RawRoute {
    route_id: String,
    route_type: i32,
}

#[derive(Debug, Deserialize)]
struct RawTrip {
    route_id: String,
    service_id: String,
    trip_id: String,
}

#[derive(Debug, Deserialize)]
struct RawCalendar {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct RawCalendarDate {
    service_id: String,
    date: String,
    exception_type: u8,
}

#[derive(Debug, Deserialize)]
struct RawStop {
    stop_id: String,
    stop_lat: Option<f64>,
    stop_lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawStopTime {
    trip_id: String,
    #[serde(default)]
    arrival_time: String,
    #[serde(default)]
    departure_time: String,
    stop_id: String,
    stop_sequence: u32,
}

/// Parses the archive in `bytes`, keeping services active on `date`.
pub fn read_archive(bytes: &[u8], date: NaiveDate) -> Result<ScheduleFeed> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).context("GTFS archive is not a zip file")?;

    let routes: Vec<RawRoute> = read_table(&mut archive, "routes.txt")?;
    let trips: Vec<RawTrip> = read_table(&mut archive, "trips.txt")?;
    let calendar: Vec<RawCalendar> = read_optional_table(&mut archive, "calendar.txt")?;
    let calendar_dates: Vec<RawCalendarDate> =
        read_optional_table(&mut archive, "calendar_dates.txt")?;
    let stops: Vec<RawStop> = read_table(&mut archive, "stops.txt")?;
    let raw_stop_times: Vec<RawStopTime> = read_table(&mut archive, "stop_times.txt")?;

    let active_services = active_services(&calendar, &calendar_dates, date);
    info!(
        date = %date,
        services = active_services.len(),
        routes = routes.len(),
        trips = trips.len(),
        "GTFS tables read"
    );

    let stops: HashMap<String, LatLon> = stops
        .into_iter()
        .filter_map(|s| match (s.stop_lat, s.stop_lon) {
            (Some(lat), Some(lon)) => Some((s.stop_id, LatLon::new(lat, lon))),
            _ => None,
        })
        .collect();

    let mut stop_times = Vec::with_capacity(raw_stop_times.len());
    let mut bad_times = 0usize;
    for raw in raw_stop_times {
        let time_str = if raw.departure_time.is_empty() {
            &raw.arrival_time
        } else {
            &raw.departure_time
        };
        match time_str.parse() {
            Ok(time) => stop_times.push(StopTimeRow {
                trip_id: raw.trip_id,
                stop_sequence: raw.stop_sequence,
                time,
                stop_id: raw.stop_id,
            }),
            Err(_) => bad_times += 1,
        }
    }
    if bad_times > 0 {
        warn!(rows = bad_times, "Stop times without a usable time, skipped");
    }

    Ok(ScheduleFeed {
        routes: routes
            .into_iter()
            .map(|r| RouteRow {
                route_id: r.route_id,
                route_type: r.route_type,
            })
            .collect(),
        trips: trips
            .into_iter()
            .map(|t| TripRow {
                trip_id: t.trip_id,
                route_id: t.route_id,
                service_id: t.service_id,
            })
            .collect(),
        active_services,
        stops,
        stop_times,
    })
}

fn active_services(
    calendar: &[RawCalendar],
    calendar_dates: &[RawCalendarDate],
    date: NaiveDate,
) -> HashSet<String> {
    let date_str = date.format("%Y%m%d").to_string();

    let mut active: HashSet<String> = calendar
        .iter()
        .filter(|c| {
            let weekday_flag = match date.weekday() {
                Weekday::Mon => c.monday,
                Weekday::Tue => c.tuesday,
                Weekday::Wed => c.wednesday,
                Weekday::Thu => c.thursday,
                Weekday::Fri => c.friday,
                Weekday::Sat => c.saturday,
                Weekday::Sun => c.sunday,
            };
            // YYYYMMDD compares correctly as text
            weekday_flag == 1 && c.start_date <= date_str && date_str <= c.end_date
        })
        .map(|c| c.service_id.clone())
        .collect();

    for exception in calendar_dates.iter().filter(|d| d.date == date_str) {
        match exception.exception_type {
            1 => {
                active.insert(exception.service_id.clone());
            }
            2 => {
                active.remove(&exception.service_id);
            }
            other => debug!(exception_type = other, "Unknown calendar exception type"),
        }
    }

    active
}

fn read_table<T, R>(archive: &mut zip::ZipArchive<R>, name: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read + Seek,
{
    let file = archive
        .by_name(name)
        .with_context(|| format!("GTFS archive has no {name}"))?;
    parse_table(file, name)
}

fn read_optional_table<T, R>(archive: &mut zip::ZipArchive<R>, name: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read + Seek,
{
    match archive.by_name(name) {
        Ok(file) => parse_table(file, name),
        Err(zip::result::ZipError::FileNotFound) => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to open {name}")),
    }
}

fn parse_table<T: DeserializeOwned>(reader: impl Read, name: &str) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .with_context(|| format!("Failed to parse {name}"))
}
