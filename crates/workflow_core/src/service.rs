//! The sole asynchronous boundary of the workflow: the analysis service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    error::ApiError,
    protocol::{AnalyzeRequest, AnalyzeResponse},
};
use thiserror::Error;
use tracing::debug;

use crate::{AnalysisOutcome, StagedImage};

/// Recoverable failures of one analysis invocation. The staged image is
/// retained across all of these so the user can retry without re-uploading.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("analysis service unreachable: {0}")]
    Transport(String),
    #[error("analysis timed out")]
    Timeout,
    #[error("analysis service returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("analysis rejected: {0}")]
    Service(String),
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, image: &StagedImage) -> Result<AnalysisOutcome, AnalysisError>;
}

/// Fallback used when a controller is constructed without a real service.
pub struct MissingAnalysisService;

#[async_trait]
impl AnalysisService for MissingAnalysisService {
    async fn analyze(&self, _image: &StagedImage) -> Result<AnalysisOutcome, AnalysisError> {
        Err(AnalysisError::Service(
            "analysis service is unavailable".into(),
        ))
    }
}

/// HTTP client for the remote inference service (`POST {service_url}/analyze`).
pub struct HttpAnalysisService {
    http: Client,
    service_url: String,
    timeout: Option<Duration>,
}

impl HttpAnalysisService {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            service_url: service_url.into(),
            timeout: None,
        }
    }

    /// Caps one invocation; expiry surfaces as [`AnalysisError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn post_analyze(
        &self,
        request: &AnalyzeRequest,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let response = self
            .http
            .post(format!("{}/analyze", self.service_url))
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiError>().await {
                Ok(envelope) => envelope.message,
                Err(_) => format!("analysis service returned status {status}"),
            };
            return Err(AnalysisError::Service(message));
        }

        let body: AnalyzeResponse = response
            .json()
            .await
            .map_err(|err| AnalysisError::MalformedResponse(err.to_string()))?;

        if !(0.0..=1.0).contains(&body.confidence) {
            return Err(AnalysisError::MalformedResponse(format!(
                "confidence {} outside [0, 1]",
                body.confidence
            )));
        }

        Ok(AnalysisOutcome {
            prediction: body.prediction,
            confidence: body.confidence,
            roi: body.roi_image,
            heatmap: body.heatmap_image,
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> AnalysisError {
    if err.is_timeout() {
        AnalysisError::Timeout
    } else {
        AnalysisError::Transport(err.to_string())
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, image: &StagedImage) -> Result<AnalysisOutcome, AnalysisError> {
        let request = AnalyzeRequest {
            media_type: image.media_type(),
            image_b64: image.payload_b64().to_string(),
        };
        debug!(
            media_type = image.media_type().as_mime(),
            size_bytes = image.size_bytes(),
            "posting image to analysis service"
        );

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.post_analyze(&request)).await {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::Timeout),
            },
            None => self.post_analyze(&request).await,
        }
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
