use std::collections::HashSet;

use futures::Stream;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use super::models::{ApiConfig, CloudcastEntry, Envelope, UserEntry};
use crate::domain::{CloudcastRecord, UserRecord};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Search phrase must not be empty")]
    EmptyQuery,

    #[error("Network failure: {0}")]
    Transient(#[source] reqwest::Error),

    #[error("Catalog service returned HTTP {status}")]
    Service { status: u16 },

    #[error("Catalog service rejected the request: {kind}: {message}")]
    Rejected { kind: String, message: String },

    #[error("Invalid response format: {0}")]
    Parse(String),

    #[error("Invalid catalog URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// One page of a user's cloudcast listing.
#[derive(Debug, Clone)]
pub struct CloudcastPage {
    pub records: Vec<CloudcastRecord>,
    /// Absent once the listing is exhausted.
    pub next: Option<Url>,
}

#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    base: Url,
    http: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self { config, base, http })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    /// `{base}/search/?q={phrase}&type=user`
    pub fn search_url(&self, phrase: &str) -> Url {
        let mut url = self.endpoint(&["search"]);
        url.query_pairs_mut()
            .append_pair("q", phrase)
            .append_pair("type", "user");
        url
    }

    /// `{base}/{username}/cloudcasts/`
    pub fn cloudcasts_url(&self, username: &str) -> Url {
        self.endpoint(&[username, "cloudcasts"])
    }

    async fn get_envelope(&self, url: &Url) -> Result<Envelope> {
        tracing::debug!(%url, "catalog request");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(ApiError::Transient)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Service {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(ApiError::Transient)?;
        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| ApiError::Parse(format!("JSON decode error: {}", e)))?;

        if let Some(error) = envelope.error {
            return Err(ApiError::Rejected {
                kind: error.kind,
                message: error.message,
            });
        }

        Ok(envelope)
    }

    fn entries(envelope: &mut Envelope) -> Result<Vec<Value>> {
        envelope
            .data
            .take()
            .ok_or_else(|| ApiError::Parse("response has no `data` array".to_string()))
    }

    /// Users whose name matches `phrase`. Malformed entries are dropped.
    pub async fn search_users(&self, phrase: &str) -> Result<Vec<UserRecord>> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(ApiError::EmptyQuery);
        }

        let mut envelope = self.get_envelope(&self.search_url(phrase)).await?;
        let users: Vec<UserRecord> = Self::entries(&mut envelope)?
            .into_iter()
            .filter_map(|entry| {
                let parsed = serde_json::from_value::<UserEntry>(entry)
                    .ok()
                    .and_then(UserEntry::into_record);
                if parsed.is_none() {
                    tracing::warn!(phrase, "dropping malformed user entry");
                }
                parsed
            })
            .collect();

        tracing::info!(phrase, found = users.len(), "user search finished");
        Ok(users)
    }

    /// A single listing page: the first one when `cursor` is `None`.
    pub async fn cloudcast_page(&self, username: &str, cursor: Option<&Url>) -> Result<CloudcastPage> {
        let url = match cursor {
            Some(url) => url.clone(),
            None => self.cloudcasts_url(username),
        };

        let mut envelope = self.get_envelope(&url).await?;
        let records: Vec<CloudcastRecord> = Self::entries(&mut envelope)?
            .into_iter()
            .filter_map(|entry| {
                let parsed = serde_json::from_value::<CloudcastEntry>(entry)
                    .ok()
                    .and_then(|entry| entry.into_record(username));
                if parsed.is_none() {
                    tracing::warn!(username, "dropping malformed cloudcast entry");
                }
                parsed
            })
            .collect();

        let next = match envelope.paging.and_then(|paging| paging.next) {
            Some(next) if !next.is_empty() => Some(self.base.join(&next)?),
            _ => None,
        };

        tracing::debug!(%url, records = records.len(), has_next = next.is_some(), "listing page");
        Ok(CloudcastPage { records, next })
    }

    /// Every listing page of `username`, fetched lazily as the stream is polled.
    ///
    /// Ends after a page without a cursor, a cursor that was already fetched, the
    /// configured page limit, or the first error.
    pub fn cloudcast_pages(
        &self,
        username: &str,
    ) -> impl Stream<Item = Result<CloudcastPage>> + Send + 'static {
        let state = PagingState {
            client: self.clone(),
            username: username.to_string(),
            cursor: Cursor::Start,
            visited: HashSet::new(),
        };

        futures::stream::unfold(state, |mut state| async move {
            let url = match std::mem::replace(&mut state.cursor, Cursor::Done) {
                Cursor::Done => return None,
                Cursor::Start => state.client.cloudcasts_url(&state.username),
                Cursor::Next(url) => url,
            };

            if state.visited.len() >= state.client.config.max_pages {
                tracing::warn!(
                    username = %state.username,
                    max_pages = state.client.config.max_pages,
                    "page limit reached, listing truncated"
                );
                return None;
            }
            state.visited.insert(url.clone());

            let page = state
                .client
                .cloudcast_page(&state.username, Some(&url))
                .await;

            if let Ok(page) = &page {
                state.cursor = match &page.next {
                    Some(next) if state.visited.contains(next) => {
                        tracing::warn!(%next, "listing cursor points to a visited page");
                        Cursor::Done
                    }
                    Some(next) => Cursor::Next(next.clone()),
                    None => Cursor::Done,
                };
            }

            Some((page, state))
        })
    }
}

enum Cursor {
    Start,
    Next(Url),
    Done,
}

struct PagingState {
    client: ApiClient,
    username: String,
    cursor: Cursor,
    visited: HashSet<Url>,
}
