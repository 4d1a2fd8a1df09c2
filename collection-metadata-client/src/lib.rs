// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Asynchronous, rate-limited, circuit-breaking HTTP fan-out that enriches
//! a package entry with metadata fetched from its hosting API (C7).
//!
//! [MetadataClient::get] derives a GitHub-shaped API base URL from a
//! package's git-compatible location, issues a mandatory main request plus
//! five best-effort subordinate requests, and assembles the results into a
//! [PackageBasicMetadata], consulting and refreshing
//! [collection_metadata_cache::MetadataCache] around the whole fetch.

use {
    backoff::{future::retry, ExponentialBackoff},
    collection_metadata_cache::MetadataCache,
    collection_model::{parse_git_location, GitLocation},
    reqwest::{Client, StatusCode},
    std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
        time::{Duration, Instant},
    },
};

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("package location does not look like a git-compatible url: {0}")]
    InvalidGitUrl(String),

    #[error("invalid auth token for {0}")]
    InvalidAuthToken(String),

    #[error("permission denied fetching {0}")]
    PermissionDenied(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("unexpected response fetching {0}: status {1}")]
    InvalidResponse(String, StatusCode),

    #[error("API rate limit exhausted for {0} (limit {1})")]
    ApiLimitsExceeded(String, u32),

    #[error("circuit breaker open for host {0}")]
    CircuitOpen(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// A single release/tag whose name parsed as semver.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ReleaseMetadata {
    pub version: semver::Version,
    pub name: Option<String>,
    pub body: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct AuthorMetadata {
    pub login: String,
    pub url: String,
    pub service: String,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct LicenseMetadata {
    #[serde(rename = "type")]
    pub license_type: String,
    pub download_url: Option<String>,
}

/// The enrichment result assembled from a package's hosting API (§4.7
/// "Result assembly").
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct PackageBasicMetadata {
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub versions: Vec<ReleaseMetadata>,
    pub watchers_count: u64,
    pub readme_url: Option<String>,
    pub license: Option<LicenseMetadata>,
    pub authors: Vec<AuthorMetadata>,
    pub languages: HashSet<String>,
    pub processed_at: chrono::DateTime<chrono::Utc>,
}

/// A per-host sliding error count over a fixed window, opening the circuit
/// once the error count within the window crosses a threshold.
struct CircuitState {
    errors: Vec<Instant>,
}

impl CircuitState {
    fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn record_error(&mut self, window: Duration) {
        let now = Instant::now();
        self.errors.retain(|t| now.duration_since(*t) <= window);
        self.errors.push(now);
    }

    fn is_open(&mut self, window: Duration, threshold: usize) -> bool {
        let now = Instant::now();
        self.errors.retain(|t| now.duration_since(*t) <= window);
        self.errors.len() >= threshold
    }
}

/// Rate-limit response header inspection outcome.
enum RateLimitCheck {
    Ok,
    Exhausted { limit: Option<u32> },
}

fn check_rate_limit(response: &reqwest::Response, threshold: u32) -> RateLimitCheck {
    let headers = response.headers();

    let limit: Option<u32> = headers
        .get("X-RateLimit-Limit")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let remaining: Option<u32> = headers
        .get("X-RateLimit-Remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    match remaining {
        Some(0) => RateLimitCheck::Exhausted { limit },
        Some(remaining) if remaining < threshold => {
            log::warn!(
                "API rate limit remaining ({remaining}) is below the warning threshold ({threshold}); consider configuring a token"
            );
            RateLimitCheck::Ok
        }
        _ => RateLimitCheck::Ok,
    }
}

/// Derives the `authTokenType` for a host: strip a leading `api.` and
/// prefix with the provider name, e.g. `github(host)`.
fn auth_token_type(host: &str) -> String {
    let stripped = host.strip_prefix("api.").unwrap_or(host);
    format!("github({stripped})")
}

pub struct MetadataClientConfig {
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub circuit_breaker_window: Duration,
    pub circuit_breaker_threshold: usize,
    pub rate_limit_warn_threshold: u32,
    pub tokens: HashMap<String, String>,
}

impl Default for MetadataClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(1),
            max_attempts: 3,
            backoff_base: Duration::from_millis(50),
            circuit_breaker_window: Duration::from_secs(30),
            circuit_breaker_threshold: 50,
            rate_limit_warn_threshold: 5,
            tokens: HashMap::new(),
        }
    }
}

pub struct MetadataClient {
    client: Client,
    config: MetadataClientConfig,
    circuits: Mutex<HashMap<String, CircuitState>>,
    cache: Option<MetadataCache<PackageBasicMetadata>>,
}

impl MetadataClient {
    pub fn new(config: MetadataClientConfig, cache: Option<MetadataCache<PackageBasicMetadata>>) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            config,
            circuits: Mutex::new(HashMap::new()),
            cache,
        })
    }

    fn auth_header(&self, host: &str) -> Option<String> {
        self.config.tokens.get(&auth_token_type(host)).cloned()
    }

    fn circuit_is_open(&self, host: &str) -> bool {
        let mut circuits = self.circuits.lock().expect("circuit breaker mutex poisoned");
        let state = circuits.entry(host.to_string()).or_insert_with(CircuitState::new);
        state.is_open(self.config.circuit_breaker_window, self.config.circuit_breaker_threshold)
    }

    fn record_host_error(&self, host: &str) {
        let mut circuits = self.circuits.lock().expect("circuit breaker mutex poisoned");
        let state = circuits.entry(host.to_string()).or_insert_with(CircuitState::new);
        state.record_error(self.config.circuit_breaker_window);
    }

    async fn request_with_retry(&self, url: &str, token: Option<&str>) -> Result<Option<reqwest::Response>> {
        let backoff = ExponentialBackoff {
            initial_interval: self.config.backoff_base,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let max_attempts = self.config.max_attempts;
        let mut attempts = 0u32;

        let outcome = retry(backoff, || {
            attempts += 1;
            let attempt = attempts;

            async move {
                let mut request = self.client.get(url);
                if let Some(token) = token {
                    request = request.header("Authorization", format!("token {token}"));
                }

                match request.send().await {
                    Ok(response) => Ok(response),
                    Err(e) if (e.is_timeout() || e.is_connect()) && attempt < max_attempts => {
                        Err(backoff::Error::transient(MetadataError::Transport(e)))
                    }
                    Err(e) => Err(backoff::Error::permanent(MetadataError::Transport(e))),
                }
            }
        })
        .await;

        match outcome {
            Ok(response) => Ok(Some(response)),
            Err(e) => {
                log::warn!("request to {url} failed after retries: {e}");
                Err(e)
            }
        }
    }

    /// Fetch and assemble metadata for `identity` at the git-compatible
    /// `location`, consulting the cache first and writing the assembled
    /// value back on success.
    pub async fn get(&self, identity: &str, location: &str) -> Result<PackageBasicMetadata> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(identity) {
                return Ok(cached);
            }
        }

        let git_location =
            parse_git_location(location).map_err(|_| MetadataError::InvalidGitUrl(location.to_string()))?;

        let metadata = self.fetch(&git_location).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(identity, metadata.clone(), true) {
                log::warn!("failed writing {identity:?} back to the metadata cache: {e}");
            }
        }

        Ok(metadata)
    }

    async fn fetch(&self, location: &GitLocation) -> Result<PackageBasicMetadata> {
        if self.circuit_is_open(&location.host) {
            return Err(MetadataError::CircuitOpen(location.host.clone()));
        }

        let base = format!("https://api.{}/repos/{}/{}", location.host, location.owner, location.repo);
        let token = self.auth_header(&location.host);

        let main_response = match self.request_with_retry(&base, token.as_deref()).await {
            Ok(Some(response)) => response,
            Ok(None) | Err(_) => {
                self.record_host_error(&location.host);
                return Err(MetadataError::InvalidResponse(base, StatusCode::INTERNAL_SERVER_ERROR));
            }
        };

        let status = main_response.status();
        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED if token.is_some() => {
                self.record_host_error(&location.host);
                return Err(MetadataError::InvalidAuthToken(base));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.record_host_error(&location.host);
                return Err(MetadataError::PermissionDenied(base));
            }
            StatusCode::NOT_FOUND => {
                self.record_host_error(&location.host);
                return Err(MetadataError::NotFound(base));
            }
            other => {
                self.record_host_error(&location.host);
                return Err(MetadataError::InvalidResponse(base, other));
            }
        }

        if let RateLimitCheck::Exhausted { limit } = check_rate_limit(&main_response, self.config.rate_limit_warn_threshold) {
            log::warn!("API rate limit exhausted for {base}; configure an auth token to raise it");
            return Err(MetadataError::ApiLimitsExceeded(base, limit.unwrap_or(0)));
        }

        let repo: serde_json::Value = main_response.json().await?;

        let releases_url = format!("{base}/releases?per_page=20");
        let contributors_url = format!("{base}/contributors");
        let readme_url = format!("{base}/readme");
        let license_url = format!("{base}/license");
        let languages_url = format!("{base}/languages");

        let (releases, contributors, readme, license, languages) = tokio::join!(
            self.fetch_subordinate(&releases_url, token.as_deref()),
            self.fetch_subordinate(&contributors_url, token.as_deref()),
            self.fetch_subordinate(&readme_url, token.as_deref()),
            self.fetch_subordinate(&license_url, token.as_deref()),
            self.fetch_subordinate(&languages_url, token.as_deref()),
        );

        Ok(assemble(repo, releases, contributors, readme, license, languages))
    }

    /// A subordinate fetch tolerates any failure, returning `None` rather
    /// than propagating an error; only the main request is mandatory.
    async fn fetch_subordinate(&self, url: &str, token: Option<&str>) -> Option<serde_json::Value> {
        match self.request_with_retry(url, token).await {
            Ok(Some(response)) if response.status() == StatusCode::OK => response.json().await.ok(),
            _ => None,
        }
    }
}

fn assemble(
    repo: serde_json::Value,
    releases: Option<serde_json::Value>,
    contributors: Option<serde_json::Value>,
    readme: Option<serde_json::Value>,
    license: Option<serde_json::Value>,
    languages: Option<serde_json::Value>,
) -> PackageBasicMetadata {
    let summary = repo.get("description").and_then(|v| v.as_str()).map(String::from);
    let keywords = repo
        .get("topics")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let watchers_count = repo.get("watchers_count").and_then(|v| v.as_u64()).unwrap_or(0);
    let repo_language = repo.get("language").and_then(|v| v.as_str()).map(String::from);

    let versions = releases
        .as_ref()
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|release| {
                    let tag_name = release.get("tag_name")?.as_str()?;
                    let version = semver::Version::parse(tag_name.trim_start_matches('v')).ok()?;
                    Some(ReleaseMetadata {
                        version,
                        name: release.get("name").and_then(|v| v.as_str()).map(String::from),
                        body: release.get("body").and_then(|v| v.as_str()).map(String::from),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let authors = contributors
        .as_ref()
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|contributor| {
                    Some(AuthorMetadata {
                        login: contributor.get("login")?.as_str()?.to_string(),
                        url: contributor.get("html_url").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                        service: "GitHub".to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let readme_url = readme.as_ref().and_then(|v| v.get("download_url")).and_then(|v| v.as_str()).map(String::from);

    let license = license.as_ref().and_then(|v| v.get("license")).map(|license| LicenseMetadata {
        license_type: license.get("spdx_id").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
        download_url: license.get("download_url").and_then(|v| v.as_str()).map(String::from),
    });

    let mut language_set: HashSet<String> = languages
        .as_ref()
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default();
    if let Some(lang) = repo_language {
        language_set.insert(lang);
    }

    PackageBasicMetadata {
        summary,
        keywords,
        versions,
        watchers_count,
        readme_url,
        license,
        authors,
        languages: language_set,
        processed_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_token_type_strips_api_prefix() {
        assert_eq!(auth_token_type("api.github.com"), "github(github.com)");
        assert_eq!(auth_token_type("github.example.com"), "github(github.example.com)");
    }

    #[test]
    fn assemble_drops_non_semver_release_tags() {
        let repo = serde_json::json!({"description": "a package", "watchers_count": 3});
        let releases = serde_json::json!([
            {"tag_name": "v1.2.3", "name": "release"},
            {"tag_name": "not-a-version", "name": "bad"},
        ]);

        let metadata = assemble(repo, Some(releases), None, None, None, None);

        assert_eq!(metadata.versions.len(), 1);
        assert_eq!(metadata.versions[0].version, semver::Version::parse("1.2.3").unwrap());
        assert_eq!(metadata.summary.as_deref(), Some("a package"));
        assert_eq!(metadata.watchers_count, 3);
    }

    #[test]
    fn circuit_opens_after_threshold_errors_within_window() {
        let mut state = CircuitState::new();
        let window = Duration::from_secs(30);

        for _ in 0..49 {
            state.record_error(window);
        }
        assert!(!state.is_open(window, 50));

        state.record_error(window);
        assert!(state.is_open(window, 50));
    }
}
