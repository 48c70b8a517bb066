//! Real-Debrid implementation of the debrid boundary.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::DebridConfig;
use crate::metrics;

use super::rate_limiter::RateLimiter;
use super::{DebridError, DebridFile, DebridService};

/// Largest batch the instant-availability endpoint accepts.
pub const MAX_BATCH_SIZE: usize = 100;

/// Ceiling for a single retry wait.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Real-Debrid REST client.
///
/// Every request passes the token bucket first. HTTP 429 is retried with
/// exponential backoff (2s, 4s, ... capped at 60s) up to `max_retries` attempts.
pub struct RealDebridClient {
    client: Client,
    config: DebridConfig,
    limiter: RateLimiter,
    backoff_base: Duration,
    settle_delay: Duration,
}

impl RealDebridClient {
    pub fn new(config: DebridConfig) -> Result<Self, DebridError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| DebridError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter: RateLimiter::new(config.rate_limit_rpm),
            config,
            backoff_base: Duration::from_secs(2),
            settle_delay: Duration::from_secs(1),
        })
    }

    /// Override retry backoff and the pause between torrent steps.
    pub fn with_delays(mut self, backoff_base: Duration, settle_delay: Duration) -> Self {
        self.backoff_base = backoff_base;
        self.settle_delay = settle_delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send a request, retrying when rate limited. Returns the response body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        endpoint: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<String, DebridError> {
        let attempts = self.config.max_retries.max(1);
        let mut last_err = DebridError::RateLimited;

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = retry_backoff(self.backoff_base, attempt);
                debug!(attempt, backoff_ms = backoff.as_millis() as u64, "Retrying Real-Debrid request");
                tokio::time::sleep(backoff).await;
            }

            self.limiter.acquire().await;

            let mut builder = self
                .client
                .request(method.clone(), self.url(path))
                .bearer_auth(&self.config.api_key);
            if let Some(form) = form {
                builder = builder.form(form);
            }

            let start = Instant::now();
            let result = builder.send().await;
            metrics::DEBRID_REQUEST_DURATION
                .with_label_values(&[endpoint])
                .observe(start.elapsed().as_secs_f64());

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!(endpoint, error = %e, "Real-Debrid request failed");
                    last_err = e.into();
                    continue;
                }
            };

            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!(endpoint, attempt, "Rate limited by Real-Debrid");
                    last_err = DebridError::RateLimited;
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(DebridError::Unauthorized);
                }
                s if s.is_success() => return Ok(body),
                s => {
                    return Err(DebridError::ApiError {
                        status: s.as_u16(),
                        message: body.chars().take(200).collect(),
                    });
                }
            }
        }

        Err(last_err)
    }

    async fn add_magnet(&self, hash: &str) -> Result<String, DebridError> {
        let magnet = format!("magnet:?xt=urn:btih:{}", hash);
        let body = self
            .request(
                Method::POST,
                "torrents/addMagnet",
                "add_magnet",
                Some(&[("magnet", magnet.as_str())][..]),
            )
            .await?;
        let added: AddMagnetResponse = serde_json::from_str(&body)?;
        Ok(added.id)
    }

    async fn torrent_info(&self, id: &str) -> Result<TorrentInfo, DebridError> {
        let body = self
            .request(Method::GET, &format!("torrents/info/{}", id), "torrent_info", None)
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn select_files(&self, id: &str, file_index: Option<u32>) -> Result<(), DebridError> {
        // Real-Debrid file ids are 1-based; addon file indexes are 0-based
        let files = file_index
            .map(|i| (i + 1).to_string())
            .unwrap_or_else(|| "all".to_string());
        self.request(
            Method::POST,
            &format!("torrents/selectFiles/{}", id),
            "select_files",
            Some(&[("files", files.as_str())][..]),
        )
        .await?;
        Ok(())
    }

    async fn unrestrict(&self, link: &str) -> Result<String, DebridError> {
        let body = self
            .request(
                Method::POST,
                "unrestrict/link",
                "unrestrict",
                Some(&[("link", link)][..]),
            )
            .await?;
        let unrestricted: UnrestrictResponse = serde_json::from_str(&body)?;
        unrestricted.playback_url().ok_or(DebridError::NoLinks)
    }

    async fn delete_torrent(&self, id: &str) {
        if let Err(e) = self
            .request(
                Method::DELETE,
                &format!("torrents/delete/{}", id),
                "delete",
                None,
            )
            .await
        {
            warn!(torrent_id = %id, error = %e, "Failed to delete Real-Debrid torrent");
        }
    }

    /// Steps after the magnet is added. The caller deletes the torrent on failure.
    async fn resolve_added(
        &self,
        id: &str,
        hash: &str,
        file_index: Option<u32>,
    ) -> Result<String, DebridError> {
        tokio::time::sleep(self.settle_delay).await;
        let mut info = self.torrent_info(id).await?;
        debug!(torrent_id = %id, status = %info.status, links = info.links.len(), "Torrent info");

        if info.status == "waiting_files_selection" {
            self.select_files(id, file_index).await?;
            tokio::time::sleep(self.settle_delay).await;
            info = self.torrent_info(id).await?;
        }

        if info.status != "downloaded" {
            return Err(DebridError::NotCached(format!(
                "{} (status: {})",
                hash, info.status
            )));
        }

        let link = info.links.first().ok_or(DebridError::NoLinks)?;
        self.unrestrict(link).await
    }

    async fn check_batch(&self, batch: &[String]) -> Result<HashMap<String, bool>, DebridError> {
        let path = format!("torrents/instantAvailability/{}", batch.join("/"));
        let body = self
            .request(Method::GET, &path, "instant_availability", None)
            .await?;
        let response: HashMap<String, serde_json::Value> = serde_json::from_str(&body)?;
        Ok(parse_availability(&response, batch))
    }
}

#[async_trait]
impl DebridService for RealDebridClient {
    fn service_name(&self) -> &str {
        "Real-Debrid"
    }

    async fn check_cache(&self, hashes: &[String]) -> Result<HashMap<String, bool>, DebridError> {
        let mut availability = HashMap::with_capacity(hashes.len());
        let batch_size = self.config.batch_size.clamp(1, MAX_BATCH_SIZE);

        for batch in hashes.chunks(batch_size) {
            availability.extend(self.check_batch(batch).await?);
        }

        info!(
            total = hashes.len(),
            cached = availability.values().filter(|c| **c).count(),
            "Checked Real-Debrid cache"
        );
        Ok(availability)
    }

    async fn get_stream_url(
        &self,
        hash: &str,
        file_index: Option<u32>,
    ) -> Result<String, DebridError> {
        let id = self.add_magnet(hash).await?;
        debug!(hash, torrent_id = %id, "Added magnet");

        match self.resolve_added(&id, hash, file_index).await {
            Ok(url) => Ok(url),
            Err(e) => {
                self.delete_torrent(&id).await;
                Err(e)
            }
        }
    }

    async fn available_files(&self, hash: &str) -> Result<Vec<DebridFile>, DebridError> {
        let path = format!("torrents/instantAvailability/{}", hash);
        let body = self
            .request(Method::GET, &path, "instant_availability", None)
            .await?;
        let response: HashMap<String, serde_json::Value> = serde_json::from_str(&body)?;

        let files = parse_files(response.get(&hash.to_lowercase()));
        if files.is_empty() {
            return Err(DebridError::NotCached(hash.to_string()));
        }
        Ok(files)
    }

    async fn is_authenticated(&self) -> bool {
        self.request(Method::GET, "user", "user", None).await.is_ok()
    }
}

#[derive(Debug, Deserialize)]
struct AddMagnetResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    #[serde(default)]
    status: String,
    #[serde(default)]
    links: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UnrestrictResponse {
    #[serde(default)]
    download: String,
    #[serde(default)]
    link: String,
}

impl UnrestrictResponse {
    /// The direct `download` URL, falling back to `link`.
    fn playback_url(self) -> Option<String> {
        if !self.download.is_empty() {
            Some(self.download)
        } else if !self.link.is_empty() {
            Some(self.link)
        } else {
            None
        }
    }
}

/// Wait before retry `attempt` (1-based): `base * 2^(attempt - 1)`, capped.
fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |backoff| backoff.min(MAX_BACKOFF))
}

/// Map an instant-availability response onto the requested hashes.
///
/// A hash is cached when its entry holds at least one non-empty host variant list
/// (`{"<hash>": {"rd": [{...}]}}`). Absent hashes and `[]` / `{}` entries are not.
fn parse_availability(
    response: &HashMap<String, serde_json::Value>,
    batch: &[String],
) -> HashMap<String, bool> {
    batch
        .iter()
        .map(|hash| {
            let cached = response
                .get(&hash.to_lowercase())
                .and_then(|v| v.as_object())
                .map(|hosts| {
                    hosts
                        .values()
                        .any(|variants| variants.as_array().is_some_and(|a| !a.is_empty()))
                })
                .unwrap_or(false);
            (hash.clone(), cached)
        })
        .collect()
}

/// Files of the first cached variant: `{"rd": [{"1": {"filename": .., "filesize": ..}}]}`.
fn parse_files(entry: Option<&serde_json::Value>) -> Vec<DebridFile> {
    let Some(hosts) = entry.and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let variant = hosts
        .values()
        .filter_map(|v| v.as_array())
        .flat_map(|variants| variants.iter())
        .find_map(|v| v.as_object());

    let mut files: Vec<DebridFile> = variant
        .map(|files| {
            files
                .iter()
                .filter_map(|(id, file)| {
                    Some(DebridFile {
                        index: id.parse().ok()?,
                        path: file.get("filename")?.as_str()?.to_string(),
                        size: file.get("filesize").and_then(|s| s.as_u64()).unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    files.sort_by_key(|f| f.index);
    files
}
