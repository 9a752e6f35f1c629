use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::updater::error::UpdateError;
use crate::util::{format_speed, progress_percent};

const USER_AGENT: &str = concat!("wallpaper-cache-updater/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP access shared by the version check and both fetch strategies.
///
/// Every request is bounded by the client timeout, so a dead endpoint turns
/// into an error instead of hanging the update worker.
#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
}

impl NetworkClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    pub async fn get_text(&self, url: &str) -> Result<String, UpdateError> {
        let resp = self.get_ok(url).await?;
        resp.text().await.map_err(|e| network(url, e))
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, UpdateError> {
        let resp = self.get_ok(url).await?;
        resp.bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| network(url, e))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, UpdateError> {
        let text = self.get_text(url).await?;
        serde_json::from_str(&text).map_err(|e| UpdateError::MalformedManifest(e.to_string()))
    }

    /// Stream `url` into `dest`, failing if fewer bytes arrive than announced.
    pub async fn download_to_path(&self, url: &str, dest: &Path) -> Result<u64, UpdateError> {
        let resp = self.get_ok(url).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::io("failed to create download dir", e))?;
        }
        let mut file = File::create(dest)
            .await
            .map_err(|e| UpdateError::io(format!("failed to create {}", dest.display()), e))?;

        let total = resp.content_length();
        let mut stream = resp.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_tick = Instant::now();
        let mut last_bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| UpdateError::io("write error", e))?;
            downloaded += chunk.len() as u64;

            let since = last_tick.elapsed().as_secs_f32();
            if since > 0.5 {
                let speed = (downloaded - last_bytes) as f32 / since;
                debug!(
                    "download: {:.1}% of {} ({})",
                    progress_percent(downloaded, total),
                    url,
                    format_speed(speed)
                );
                last_tick = Instant::now();
                last_bytes = downloaded;
            }
        }

        file.flush()
            .await
            .map_err(|e| UpdateError::io("flush error", e))?;

        if let Some(total) = total
            && downloaded < total
        {
            return Err(UpdateError::Network {
                url: url.to_owned(),
                message: format!("download incomplete: received {downloaded} of {total} bytes"),
            });
        }
        Ok(downloaded)
    }

    async fn get_ok(&self, url: &str) -> Result<reqwest::Response, UpdateError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(UpdateError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

fn network(url: &str, err: reqwest::Error) -> UpdateError {
    let message = if err.is_timeout() {
        "timed out".to_owned()
    } else {
        err.to_string()
    };
    UpdateError::Network {
        url: url.to_owned(),
        message,
    }
}
