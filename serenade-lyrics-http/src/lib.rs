use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use serenade_core::{ContentConfig, ContentSource, CoreError};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const SOURCE_NAME: &str = "http";

/// Lyrics source backed by the Serenade lyrics API
pub struct HttpContentSource {
    client: ClientWithMiddleware,
    endpoint: Url,
}

impl HttpContentSource {
    /// Create a new HTTP source from the `[content]` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: &ContentConfig) -> Result<Self, CoreError> {
        let endpoint = endpoint_url(&config.base_url, &config.lyrics_path)?;

        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("Serenade/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        info!("Lyrics endpoint: {}", endpoint);
        Ok(Self { client, endpoint })
    }

    /// Full URL lyrics are requested from
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn unavailable(reason: String) -> CoreError {
        CoreError::ContentUnavailable {
            source_name: SOURCE_NAME.to_string(),
            reason,
        }
    }
}

/// Join the API base and the lyrics path, keeping any path prefix on the base
fn endpoint_url(base_url: &str, lyrics_path: &str) -> Result<Url, CoreError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        lyrics_path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| CoreError::ConfigInvalid {
        message: format!("lyrics endpoint {joined} is not a valid URL: {e}"),
    })
}

/// Body of a lyrics response: `{"lyrics": ["line", ...]}`
#[derive(Debug, Deserialize)]
struct LyricsResponse {
    lyrics: Option<Vec<String>>,
}

#[async_trait]
impl ContentSource for HttpContentSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn fetch_lyrics(&self) -> Result<Vec<String>, CoreError> {
        debug!("GET {}", self.endpoint);

        let response = self.client.get(self.endpoint.clone()).send().await?;
        let status = response.status();
        debug!("Lyrics response status: {}", status);

        if !status.is_success() {
            warn!("Lyrics API returned status: {}", status);
            return Err(Self::unavailable(format!("server returned status {status}")));
        }

        let body: LyricsResponse = response.json().await?;
        let lines = body
            .lyrics
            .ok_or_else(|| Self::unavailable("response has no lyrics".into()))?;

        info!("Lyrics API returned {} lines", lines.len());
        Ok(lines)
    }
}
