//! Output sinks: protobuf feeds and their JSON mirrors.
//!
//! Every feed is written twice, `<name>.pb` with the binary encoding and
//! `<name>.pbn` with a readable dump of the same message.

pub mod feed;
pub mod mirror;

pub use feed::{alerts_feed, unix_time, vehicles_feed};
pub use mirror::{AlertsMirror, VehiclesMirror};

use anyhow::{Context, Result};
use prost::Message;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::gtfs_rt::FeedMessage;

/// Writes `feed` as `<dir>/<name>.pb` and `<dir>/<name>.pbn`, creating `dir`
/// if needed. Returns the binary file's path.
pub fn write_feed(dir: impl AsRef<Path>, name: &str, feed: &FeedMessage) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let binary = dir.join(format!("{name}.pb"));
    fs::write(&binary, feed.encode_to_vec())
        .with_context(|| format!("Failed to write {}", binary.display()))?;

    let readable = dir.join(format!("{name}.pbn"));
    fs::write(&readable, format!("{feed:#?}\n"))
        .with_context(|| format!("Failed to write {}", readable.display()))?;

    info!(path = %binary.display(), entities = feed.entity.len(), "Feed written");
    Ok(binary)
}

/// Pretty-printed JSON, creating the parent directory if needed.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "JSON written");
    Ok(())
}

/// Decodes a binary GTFS-RT feed.
pub fn read_feed(bytes: &[u8]) -> Result<FeedMessage> {
    Ok(FeedMessage::decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{FeedEntity, FeedHeader};
    use std::env;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir); // clean up any prior run
        dir
    }

    fn sample_feed() -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1_791_957_600),
                incrementality: None,
                feed_version: None,
            },
            entity: vec![FeedEntity {
                id: "v-523-3".to_string(),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_write_feed_creates_both_files() {
        let dir = temp_dir("warsaw_gtfs_rt_write_feed");
        let feed = sample_feed();

        let binary = write_feed(&dir, "vehicles", &feed).unwrap();

        assert_eq!(binary, dir.join("vehicles.pb"));
        let decoded = read_feed(&fs::read(&binary).unwrap()).unwrap();
        assert_eq!(decoded, feed);

        let readable = fs::read_to_string(dir.join("vehicles.pbn")).unwrap();
        assert!(readable.contains("v-523-3"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_json() {
        let dir = temp_dir("warsaw_gtfs_rt_write_json");
        let path = dir.join("nested").join("alerts.json");

        write_json(&path, &serde_json::json!({"time": "now", "alerts": []})).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"alerts\": []"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_feed_rejects_garbage() {
        assert!(read_feed(&[0xFF, 0xFE, 0x00, 0x01]).is_err());
    }
}
