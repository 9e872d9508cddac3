//! Catalog API client: client-credentials token and track search

use std::{rc::Rc, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;

use crate::{
    config::{self, Credentials},
    domain::normalize::Normalizer,
    download::TrackResolver,
    pacing::Sleeper,
    remote::{
        error::RemoteError,
        http::{HttpTransport, TransportError},
    },
    reporter::Reporter,
};

pub const TOKEN_URL: &str = "https://auth.tidal.com/v1/oauth2/token";
pub const SEARCH_URL: &str = "https://openapi.tidal.com/v2/searchresults";
pub const BROWSE_URL: &str = "https://tidal.com/browse/track";

#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Exchanges client credentials for a bearer token.
///
/// Any failure here is fatal for the run: nothing can be resolved without a token.
pub fn fetch_access_token(
    transport: &dyn HttpTransport,
    credentials: &Credentials,
    reporter: &dyn Reporter,
) -> Result<AccessToken, RemoteError> {
    let basic = STANDARD.encode(format!(
        "{}:{}",
        credentials.client_id, credentials.client_secret
    ));
    let reply = transport.post_form(
        TOKEN_URL,
        &format!("Basic {basic}"),
        &[("grant_type", "client_credentials")],
    )?;

    if reply.status != 200 {
        return Err(RemoteError::TokenRejected {
            status: reply.status,
            body: reply.body,
        });
    }

    let token: TokenResponse = serde_json::from_str(&reply.body)?;
    match token.expires_in {
        Some(secs) => reporter.info(&format!("access token issued, valid for {secs}s")),
        None => reporter.info("access token issued"),
    }
    Ok(AccessToken(token.access_token))
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    relationships: Relationships,
}

#[derive(Debug, Default, Deserialize)]
struct Relationships {
    #[serde(default)]
    tracks: TrackRelationship,
}

#[derive(Debug, Default, Deserialize)]
struct TrackRelationship {
    #[serde(default)]
    data: Vec<ResourceIdentifier>,
}

#[derive(Debug, Deserialize)]
struct ResourceIdentifier {
    id: String,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub country_code: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl From<&config::Catalog> for SearchSettings {
    fn from(cfg: &config::Catalog) -> Self {
        Self {
            country_code: cfg.country_code.clone(),
            timeout: cfg.search_timeout(),
            max_attempts: cfg.max_attempts.max(1),
            base_delay: cfg.retry_base_delay(),
        }
    }
}

pub struct CatalogClient<T: HttpTransport, S: Sleeper> {
    transport: T,
    sleeper: S,
    token: AccessToken,
    settings: SearchSettings,
    normalizer: Normalizer,
    reporter: Rc<dyn Reporter>,
}

impl<T: HttpTransport, S: Sleeper> CatalogClient<T, S> {
    pub fn new(
        transport: T,
        sleeper: S,
        token: AccessToken,
        settings: SearchSettings,
        normalizer: Normalizer,
        reporter: Rc<dyn Reporter>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            token,
            settings,
            normalizer,
            reporter,
        }
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{SEARCH_URL}/{}?countryCode={}&include=tracks",
            urlencoding::encode(query),
            urlencoding::encode(&self.settings.country_code)
        )
    }

    /// Searches the catalog for `"title artist"` and returns the first hit's browse url.
    ///
    /// Timeouts and 429 responses are retried up to `max_attempts` in total; a 429 on
    /// attempt `n` waits `n * base_delay`. Empty results, other statuses and any other
    /// error end the search with `None`.
    pub fn search(&self, title: &str, artist: &str) -> Option<String> {
        let query = self.normalizer.normalize(&format!("{title} {artist}"));
        let url = self.search_url(query.as_str());
        let max_attempts = self.settings.max_attempts;

        for attempt in 1..=max_attempts {
            if attempt == 1 {
                self.reporter.info(&format!("search query: {query}"));
            } else {
                self.reporter
                    .info(&format!("retry {attempt}/{max_attempts}: {query}"));
            }

            let is_last = attempt == max_attempts;
            match self
                .transport
                .get(&url, &self.token.0, self.settings.timeout)
            {
                Ok(reply) if reply.status == 200 => {
                    return match serde_json::from_str::<SearchResponse>(&reply.body) {
                        Ok(response) => match response.data.relationships.tracks.data.first() {
                            Some(track) => {
                                self.reporter.info(&format!("catalog hit: {}", track.id));
                                Some(format!("{BROWSE_URL}/{}", track.id))
                            }
                            None => {
                                self.reporter.warn(&format!("no search results: {query}"));
                                None
                            }
                        },
                        Err(e) => {
                            self.reporter
                                .warn(&format!("unreadable search response: {e}"));
                            None
                        }
                    };
                }
                Ok(reply) if reply.status == 429 => {
                    if is_last {
                        self.reporter
                            .warn(&format!("rate limited, giving up on {query}"));
                        break;
                    }
                    let wait = self.settings.base_delay * attempt;
                    self.reporter.warn(&format!(
                        "rate limited, retrying in {}s",
                        wait.as_secs_f64()
                    ));
                    self.sleeper.sleep(wait);
                }
                Ok(reply) => {
                    self.reporter.error(&format!(
                        "search failed: {} - {}",
                        reply.status, reply.body
                    ));
                    return None;
                }
                Err(TransportError::Timeout) => {
                    self.reporter.warn("search timed out");
                    if is_last {
                        break;
                    }
                    self.sleeper.sleep(self.settings.base_delay);
                }
                Err(e) => {
                    self.reporter.warn(&format!("search aborted: {e}"));
                    return None;
                }
            }
        }

        None
    }
}

impl<T: HttpTransport, S: Sleeper> TrackResolver for CatalogClient<T, S> {
    fn resolve(&self, title: &str, artist: &str) -> Option<String> {
        self.search(title, artist)
    }
}
