use crate::toggle::JobApi;
use async_trait::async_trait;
use flowpulse_core::{
    rest::{parse_active_status, Health, JobDag, JobDetail, JobList},
    DecodingError, JobId,
};
use reqwest::{header::ACCEPT, Response, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid base url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("undecodable response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: DecodingError,
    },
}

/// JSON/SSE client for one scheduler server.
#[derive(Clone, Debug)]
pub struct HttpJobClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpJobClient {
    pub fn new(base_url: &str) -> Result<Self, RequestError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, RequestError> {
        let invalid = |reason: String| RequestError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let base = Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("url cannot carry a path".to_string()));
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Appends percent-encoded path segments to the base url.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &Url) -> Result<Response, RequestError> {
        let response = request.send().await.map_err(|source| RequestError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_bytes(&self, segments: &[&str]) -> Result<(Url, Vec<u8>), RequestError> {
        let url = self.endpoint(segments);
        let response = self.send(self.http.get(url.clone()), &url).await?;
        let body = response.bytes().await.map_err(|source| RequestError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok((url, body.to_vec()))
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, RequestError> {
        let (url, body) = self.get_bytes(segments).await?;
        serde_json::from_slice(&body).map_err(|err| RequestError::Decode {
            url: url.to_string(),
            source: err.into(),
        })
    }

    async fn post(&self, segments: &[&str]) -> Result<(), RequestError> {
        let url = self.endpoint(segments);
        self.send(self.http.post(url.clone()), &url).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<Health, RequestError> {
        self.get_json(&["api", "health"]).await
    }

    pub async fn job_list(&self) -> Result<JobList, RequestError> {
        self.get_json(&["api", "jobs"]).await
    }

    pub async fn job_detail(&self, job: &JobId) -> Result<JobDetail, RequestError> {
        self.get_json(&["api", "jobs", job.as_str()]).await
    }

    pub async fn job_dag(&self, job: &JobId) -> Result<JobDag, RequestError> {
        self.get_json(&["api", "jobs", job.as_str(), "dag"]).await
    }

    /// Opens the server-push stream; the body is read by the event source.
    pub async fn open_stream(&self) -> Result<Response, RequestError> {
        let url = self.endpoint(&["stream"]);
        let request = self
            .http
            .get(url.clone())
            .header(ACCEPT, "text/event-stream");
        self.send(request, &url).await
    }
}

#[async_trait]
impl JobApi for HttpJobClient {
    async fn is_active(&self, job: &JobId) -> Result<bool, RequestError> {
        let (url, body) = self
            .get_bytes(&["api", "jobs", job.as_str(), "isActive"])
            .await?;
        parse_active_status(&body)
            .map(|status| status.active)
            .map_err(|source| RequestError::Decode {
                url: url.to_string(),
                source,
            })
    }

    async fn toggle_active(&self, job: &JobId) -> Result<(), RequestError> {
        self.post(&["api", "jobs", job.as_str(), "toggleActive"]).await
    }

    async fn submit(&self, job: &JobId) -> Result<(), RequestError> {
        self.post(&["api", "jobs", job.as_str(), "submit"]).await
    }
}
