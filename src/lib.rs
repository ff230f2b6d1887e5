pub mod alerts;
pub mod brigades;
pub mod config;
pub mod fetch;
pub mod geo;
pub mod matcher;
pub mod output;
pub mod schedule;
pub mod time;
pub mod upstream;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
