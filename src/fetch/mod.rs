mod basic;
mod client;

pub use basic::BasicClient;
pub use client::{HttpClient, UrlParam};

use anyhow::{Context, Result};
use tracing::debug;

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Loads `source` from a local path, or over HTTP(S) when it looks like a URL.
#[tracing::instrument(skip(client))]
pub async fn fetch_source<C: HttpClient>(client: &C, source: &str) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http://") || source.starts_with("https://") {
        fetch_bytes(client, source)
            .await
            .with_context(|| format!("Failed to download {source}"))?
    } else {
        std::fs::read(source).with_context(|| format!("Failed to read {source}"))?
    };
    debug!(bytes = bytes.len(), "Source loaded");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[tokio::test]
    async fn test_fetch_source_reads_local_file() {
        let path = format!("{}/warsaw_gtfs_rt_fetch_source.txt", env::temp_dir().display());
        fs::write(&path, b"brigades").unwrap();

        let bytes = fetch_source(&BasicClient::new(), &path).await.unwrap();
        assert_eq!(bytes, b"brigades");

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_source_missing_file() {
        let err = fetch_source(&BasicClient::new(), "/nonexistent/warsaw/brigades.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/warsaw/brigades.json"));
    }
}
