//! JSON mirrors of the protobuf feeds.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::alerts::Alert;
use crate::matcher::VehicleDecision;

const MIRROR_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize)]
pub struct VehiclesMirror<'a> {
    pub time: String,
    pub positions: Vec<&'a VehicleDecision>,
}

impl<'a> VehiclesMirror<'a> {
    pub fn new<I>(decisions: I, now: NaiveDateTime) -> Self
    where
        I: IntoIterator<Item = &'a VehicleDecision>,
    {
        Self {
            time: now.format(MIRROR_TIME_FORMAT).to_string(),
            positions: decisions.into_iter().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AlertsMirror<'a> {
    pub time: String,
    pub alerts: &'a [Alert],
}

impl<'a> AlertsMirror<'a> {
    pub fn new(alerts: &'a [Alert], now: NaiveDateTime) -> Self {
        Self {
            time: now.format(MIRROR_TIME_FORMAT).to_string(),
            alerts,
        }
    }
}
