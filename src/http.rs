//! JSON-over-HTTP implementation of [`BackendApi`].
//!
//! Thin, typed wrapper around a `reqwest::Client`. Every request carries the
//! current bearer token (read from the shared [`ApiConfig::token`] on each
//! call), non-success statuses become [`ApiError::Status`], and bodies are
//! decoded with `serde_json` so decode failures surface as
//! [`ApiError::Decode`]. Ids are percent-encoded as single path segments.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;

use crate::api::BackendApi;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::model::{
    DashboardStats, Donation, DonationFilter, DonationStatus, LikeOutcome, NewDonation,
    PendingVerification, Project, ProjectFilter, ShareOutcome,
};

/// Backend client speaking JSON over HTTP.
///
/// Clone is cheap: the underlying `reqwest::Client` and the token are
/// reference counted.
///
/// # Examples
///
/// ```no_run
/// # fn example() -> Result<(), crowdfund_sync::ApiError> {
/// use crowdfund_sync::{ApiConfig, HttpBackend};
///
/// let backend = HttpBackend::new(ApiConfig::from_env())?;
/// backend.set_token("fresh-token");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    token: Arc<RwLock<String>>,
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    /// Build a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if `config.base_url` is not an
    /// absolute http(s)-style URL, or if the HTTP client cannot be
    /// constructed (e.g. the TLS backend fails to initialize).
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ApiError::Transport(format!("invalid base URL {:?}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Transport(format!(
                "base URL {base_url} cannot carry a path"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            token: config.token,
        })
    }

    /// Replace the bearer token used by subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.into();
    }

    /// The parsed base URL every endpoint path is appended to.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// The base URL with `segments` appended, each percent-encoded on its
    /// own so an id containing `/` or `?` stays one segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ApiError::Transport(format!("base URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let builder = self.client.request(method, self.url(segments)?);
        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        if token.is_empty() {
            Ok(builder)
        } else {
            Ok(builder.bearer_auth(token.as_str()))
        }
    }

    /// Send `builder` and return the body bytes of a successful response.
    async fn send(&self, builder: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown status").to_string()
            } else {
                body
            };
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(builder).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_donations(&self, filter: &DonationFilter) -> Result<Vec<Donation>, ApiError> {
        self.json(self.request(Method::GET, &["donations"])?.query(filter))
            .await
    }

    async fn fetch_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, ApiError> {
        self.json(self.request(Method::GET, &["projects"])?.query(filter))
            .await
    }

    async fn like_project(&self, id: &str) -> Result<LikeOutcome, ApiError> {
        self.json(self.request(Method::POST, &["projects", id, "like"])?)
            .await
    }

    async fn unlike_project(&self, id: &str) -> Result<LikeOutcome, ApiError> {
        self.json(self.request(Method::DELETE, &["projects", id, "like"])?)
            .await
    }

    async fn track_view(&self, id: &str) -> Result<(), ApiError> {
        // Whatever the body holds (often nothing) is ignored.
        self.send(self.request(Method::POST, &["projects", id, "view"])?)
            .await
            .map(drop)
    }

    async fn track_share(&self, id: &str) -> Result<ShareOutcome, ApiError> {
        self.json(self.request(Method::POST, &["projects", id, "share"])?)
            .await
    }

    async fn create_donation(&self, params: &NewDonation) -> Result<Donation, ApiError> {
        self.json(self.request(Method::POST, &["donations"])?.json(params))
            .await
    }

    async fn update_donation_status(
        &self,
        id: &str,
        status: DonationStatus,
    ) -> Result<Donation, ApiError> {
        let body = serde_json::json!({ "status": status });
        self.json(
            self.request(Method::PATCH, &["admin", "donations", id, "status"])?
                .json(&body),
        )
        .await
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.json(self.request(Method::GET, &["admin", "stats"])?)
            .await
    }

    async fn pending_verifications(&self) -> Result<Vec<PendingVerification>, ApiError> {
        self.json(self.request(Method::GET, &["admin", "verifications", "pending"])?)
            .await
    }
}
