//! Stremio addon-protocol providers (Torrentio, Comet, MediaFusion).

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::AddonConfig;
use crate::quality::extract_size_gb;

use super::{MediaRequest, ProviderError, StreamCandidate, StreamProvider};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Resolution markers used for the coarse `quality` label, in priority order.
const QUALITY_MARKERS: &[&str] = &["2160P", "4K", "UHD", "1080P", "720P", "480P"];

static SEEDERS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"👤\s*(\d+)").expect("valid seeders regex"));

static URL_HASH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/([0-9a-fA-F]{40})(?:/|$)").expect("valid hash regex"));

/// Known addon flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddonKind {
    Torrentio,
    Comet,
    MediaFusion,
}

impl AddonKind {
    /// Config name.
    pub fn name(&self) -> &'static str {
        match self {
            AddonKind::Torrentio => "torrentio",
            AddonKind::Comet => "comet",
            AddonKind::MediaFusion => "mediafusion",
        }
    }

    /// Value used as `StreamCandidate::source`.
    pub fn display_name(&self) -> &'static str {
        match self {
            AddonKind::Torrentio => "Torrentio",
            AddonKind::Comet => "Comet",
            AddonKind::MediaFusion => "MediaFusion",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            AddonKind::Torrentio => "https://torrentio.strem.fun",
            AddonKind::Comet => "https://comet.elfhosted.com",
            AddonKind::MediaFusion => "https://mediafusion.elfhosted.com",
        }
    }

    /// Substrings in the stream name meaning "cached on the debrid service".
    pub fn cached_markers(&self) -> &'static [&'static str] {
        match self {
            // "[RD+]"
            AddonKind::Torrentio => &["+]"],
            AddonKind::Comet | AddonKind::MediaFusion => &["⚡"],
        }
    }

    /// Path segment embedding the debrid key, when the addon takes it in the URL.
    pub fn default_options(&self, debrid_key: &str) -> Option<String> {
        if debrid_key.is_empty() {
            return None;
        }
        let key = urlencoding::encode(debrid_key);
        match self {
            AddonKind::Torrentio => Some(format!("realdebrid={}", key)),
            AddonKind::Comet => Some(format!("c/realdebrid={}", key)),
            // MediaFusion expects an encrypted user-data segment; only usable when configured
            AddonKind::MediaFusion => None,
        }
    }
}

impl std::str::FromStr for AddonKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "torrentio" => Ok(AddonKind::Torrentio),
            "comet" => Ok(AddonKind::Comet),
            "mediafusion" => Ok(AddonKind::MediaFusion),
            other => Err(format!("unknown addon: {}", other)),
        }
    }
}

/// Provider speaking the addon `stream/<type>/<id>.json` protocol.
pub struct AddonProvider {
    kind: AddonKind,
    client: Client,
    base_url: String,
    options: Option<String>,
}

impl AddonProvider {
    pub fn new(
        kind: AddonKind,
        base_url: Option<String>,
        options: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            kind,
            client,
            base_url: base_url
                .unwrap_or_else(|| kind.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            options,
        })
    }

    /// Build from config, deriving the options segment from the debrid key when unset.
    pub fn from_config(
        kind: AddonKind,
        config: &AddonConfig,
        debrid_key: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let options = config
            .options
            .clone()
            .or_else(|| kind.default_options(debrid_key));
        Self::new(kind, config.base_url.clone(), options, timeout)
    }

    pub fn kind(&self) -> AddonKind {
        self.kind
    }

    /// Full stream-list URL for a request.
    pub fn stream_url(&self, request: &MediaRequest) -> String {
        match &self.options {
            Some(options) => format!(
                "{}/{}/stream/{}.json",
                self.base_url,
                options.trim_matches('/'),
                request.addon_path()
            ),
            None => format!("{}/stream/{}.json", self.base_url, request.addon_path()),
        }
    }

    async fn fetch(&self, request: &MediaRequest) -> Result<Vec<StreamCandidate>, ProviderError> {
        let url = self.stream_url(request);
        debug!(provider = self.kind.name(), request = %request, "Fetching addon streams");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: AddonResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        let streams = normalize_streams(body, self.kind);
        debug!(
            provider = self.kind.name(),
            streams = streams.len(),
            "Addon fetch complete"
        );
        Ok(streams)
    }
}

#[async_trait]
impl StreamProvider for AddonProvider {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn streams(&self, request: &MediaRequest) -> Result<Vec<StreamCandidate>, ProviderError> {
        self.fetch(request).await
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AddonResponse {
    #[serde(default)]
    streams: Vec<Value>,
}

/// Addon stream entry with every field read leniently.
///
/// A missing, null or mistyped field takes its default instead of
/// discarding the entry.
#[derive(Debug, Default)]
struct AddonStream {
    name: String,
    title: String,
    info_hash: String,
    file_idx: Option<u32>,
    url: String,
    filename: Option<String>,
    video_size: Option<u64>,
}

impl AddonStream {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let hints = obj.get("behaviorHints");

        // "title" wins over "description" when both are present
        let title = string_field(obj.get("title"))
            .filter(|t| !t.is_empty())
            .or_else(|| string_field(obj.get("description")))
            .unwrap_or_default();

        Some(Self {
            name: string_field(obj.get("name")).unwrap_or_default(),
            title,
            info_hash: string_field(obj.get("infoHash")).unwrap_or_default(),
            file_idx: number_field(obj.get("fileIdx")).and_then(|n| u32::try_from(n).ok()),
            url: string_field(obj.get("url")).unwrap_or_default(),
            filename: string_field(hints.and_then(|h| h.get("filename"))),
            video_size: number_field(hints.and_then(|h| h.get("videoSize"))),
        })
    }
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

/// Non-negative integer from a JSON number; floats are truncated.
fn number_field(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}

/// Normalize a decoded addon response. Only non-object entries are skipped.
pub(crate) fn normalize_streams(response: AddonResponse, kind: AddonKind) -> Vec<StreamCandidate> {
    response
        .streams
        .iter()
        .filter_map(|value| match AddonStream::from_value(value) {
            Some(raw) => Some(normalize_stream(raw, kind)),
            None => {
                debug!(provider = kind.name(), "Skipping non-object stream entry");
                None
            }
        })
        .collect()
}

fn normalize_stream(raw: AddonStream, kind: AddonKind) -> StreamCandidate {
    let title = if raw.title.is_empty() {
        raw.filename.clone().unwrap_or_default()
    } else {
        raw.title
    };

    let size = match raw.video_size {
        Some(size) if size > 0 => size,
        _ => (extract_size_gb(&title) * GIB) as u64,
    };

    let mut info_hash = raw.info_hash.to_lowercase();
    if info_hash.is_empty() {
        if let Some(caps) = URL_HASH_REGEX.captures(&raw.url) {
            info_hash = caps[1].to_lowercase();
        }
    }

    let mut quality = extract_quality_label(&title);
    if quality == "Unknown" {
        quality = extract_quality_label(&raw.name);
    }

    StreamCandidate {
        cached: kind.cached_markers().iter().any(|m| raw.name.contains(m)),
        seeders: extract_seeders(&title),
        name: raw.name,
        title,
        info_hash,
        file_idx: raw.file_idx,
        url: raw.url,
        source: kind.display_name().to_string(),
        size,
        quality,
        filename: raw.filename,
    }
}

/// First resolution marker found in the title, upper-cased, or `"Unknown"`.
pub fn extract_quality_label(title: &str) -> String {
    let upper = title.to_uppercase();
    QUALITY_MARKERS
        .iter()
        .find(|m| upper.contains(**m))
        .map(|m| m.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Seeder count from a `👤 <n>` annotation, 0 when absent.
pub fn extract_seeders(title: &str) -> u32 {
    SEEDERS_REGEX
        .captures(title)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}
